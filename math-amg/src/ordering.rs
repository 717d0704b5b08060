//! Sorting and searching on index arrays
//!
//! The coarsening and interpolation kernels keep column lists sorted so they
//! can be merged, deduplicated and searched without hashing. Everything here
//! works in place apart from the scratch buffer of [`merge_sort`].

use std::cmp::Ordering;

/// Binary search in an ascending slice.
///
/// Returns the position of some entry equal to `value`, or `None`.
pub fn binary_search<T: PartialOrd>(list: &[T], value: T) -> Option<usize> {
    let mut low = 0usize;
    let mut high = list.len();
    while low < high {
        let mid = low + (high - low) / 2;
        match value.partial_cmp(&list[mid]) {
            Some(Ordering::Less) => high = mid,
            Some(Ordering::Greater) => low = mid + 1,
            Some(Ordering::Equal) => return Some(mid),
            None => return None,
        }
    }
    None
}

/// Compact an ascending slice in place, keeping each value once.
///
/// Returns the new logical length; entries past it are left unspecified.
pub fn unique_sorted<T: PartialOrd + Copy>(numbers: &mut [T]) -> usize {
    if numbers.is_empty() {
        return 0;
    }
    let mut last = 0;
    for i in 1..numbers.len() {
        if numbers[last] < numbers[i] {
            last += 1;
            numbers[last] = numbers[i];
        }
    }
    last + 1
}

/// Stable ascending merge sort.
pub fn merge_sort<T: PartialOrd + Copy>(numbers: &mut [T]) {
    if numbers.len() < 2 {
        return;
    }
    let mut work = numbers.to_vec();
    merge_sort_range(numbers, &mut work, 0, numbers.len() - 1);
}

fn merge_sort_range<T: PartialOrd + Copy>(
    numbers: &mut [T],
    work: &mut [T],
    left: usize,
    right: usize,
) {
    if left >= right {
        return;
    }
    let mid = left + (right - left) / 2;
    merge_sort_range(numbers, work, left, mid);
    merge_sort_range(numbers, work, mid + 1, right);
    merge(numbers, work, left, mid + 1, right);
}

/// Merge the sorted runs `left..mid` and `mid..=right` of `numbers`.
fn merge<T: PartialOrd + Copy>(
    numbers: &mut [T],
    work: &mut [T],
    left: usize,
    mid: usize,
    right: usize,
) {
    let (mut i, mut j, mut pos) = (left, mid, left);
    while i < mid && j <= right {
        // `<=` keeps equal keys in their original order
        if numbers[i] <= numbers[j] {
            work[pos] = numbers[i];
            i += 1;
        } else {
            work[pos] = numbers[j];
            j += 1;
        }
        pos += 1;
    }
    while i < mid {
        work[pos] = numbers[i];
        i += 1;
        pos += 1;
    }
    while j <= right {
        work[pos] = numbers[j];
        j += 1;
        pos += 1;
    }
    numbers[left..=right].copy_from_slice(&work[left..=right]);
}

/// Ascending quicksort.
///
/// The midpoint element is swapped to the front and used as pivot; a single
/// forward scan moves strictly smaller entries left of it, so equal keys end
/// up on the right. Not stable.
pub fn quicksort<T: PartialOrd + Copy>(numbers: &mut [T]) {
    let mut lo = 0usize;
    let mut hi = numbers.len();
    // recurse into the shorter side, loop on the longer one
    while hi - lo > 1 {
        let last = partition(numbers, lo, hi - 1, |a, b| a < b);
        if last - lo < hi - last - 1 {
            quicksort(&mut numbers[lo..last]);
            lo = last + 1;
        } else {
            quicksort(&mut numbers[last + 1..hi]);
            hi = last;
        }
    }
}

/// Permute `index` so that `a[index[k]]` is non-decreasing; `a` is untouched.
pub fn quicksort_index<T: PartialOrd + Copy>(a: &[T], index: &mut [usize]) {
    let mut lo = 0usize;
    let mut hi = index.len();
    while hi - lo > 1 {
        let last = partition(index, lo, hi - 1, |x, y| a[x] < a[y]);
        if last - lo < hi - last - 1 {
            quicksort_index(a, &mut index[lo..last]);
            lo = last + 1;
        } else {
            quicksort_index(a, &mut index[last + 1..hi]);
            hi = last;
        }
    }
}

/// Partition `v[left..=right]` around its midpoint; returns the pivot slot.
fn partition<T: Copy, F>(v: &mut [T], left: usize, right: usize, less: F) -> usize
where
    F: Fn(T, T) -> bool,
{
    v.swap(left, left + (right - left) / 2);
    let mut last = left;
    for i in left + 1..=right {
        if less(v[i], v[left]) {
            last += 1;
            v.swap(last, i);
        }
    }
    v.swap(left, last);
    last
}
