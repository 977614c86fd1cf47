use std::mem::{align_of, size_of};

use super::*;

#[test]
fn runtime_structs_are_word_aligned() {
    assert_eq!(align_of::<CcHashTable>(), 8);
    assert_eq!(align_of::<OaHashTable>(), 8);
    assert_eq!(align_of::<BloomFilter>(), 8);
    assert_eq!(align_of::<Sorter>(), 8);
    assert_eq!(align_of::<Buffer>(), 8);
}

#[test]
fn entry_headers_are_two_words() {
    assert_eq!(size_of::<CcHashEntry>(), 16);
    assert_eq!(size_of::<OaHashEntry>(), 16);
    assert_eq!(size_of::<KeyValueList>(), 8);
}

#[test]
fn nullable_comparison_fn_is_pointer_sized() {
    assert_eq!(size_of::<Option<ComparisonFn>>(), 8);
    assert_eq!(size_of::<Sorter>(), 7 * 8);
}

#[test]
fn column_layout_info_is_sixteen_bytes() {
    assert_eq!(size_of::<ColumnLayoutInfo>(), 16);
    assert_eq!(std::mem::offset_of!(ColumnLayoutInfo, stride), 8);
    assert_eq!(std::mem::offset_of!(ColumnLayoutInfo, is_columnar), 12);
}
