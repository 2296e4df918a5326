// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Properties of `{low..high}` alias expansion.

use bstage::pln::{expand_numeric_range, RangeError};

#[test]
fn test_expansion_count_order_and_format() {
    for (low, high) in [(1u32, 2u32), (0, 9), (7, 31), (98, 102), (1, 100)] {
        let input = format!("node{{{low}..{high}}}.lan");
        let hosts = expand_numeric_range(&input, 1000).unwrap();

        // exactly high-low+1 aliases, ascending, no zero padding
        assert_eq!(hosts.len(), (high - low + 1) as usize, "{input}");
        for (i, host) in hosts.iter().enumerate() {
            assert_eq!(host, &format!("node{}.lan", low + i as u32));
        }
    }
}

#[test]
fn test_plain_names_pass_through() {
    for name in ["db1", "db1.example.com", "a-b-c", "10.0.0.7"] {
        assert_eq!(expand_numeric_range(name, 100).unwrap(), vec![name]);
    }
}

#[test]
fn test_non_ascending_ranges_rejected() {
    assert_eq!(
        expand_numeric_range("n{5..5}", 100),
        Err(RangeError::NonAscending { low: 5, high: 5 })
    );
    assert_eq!(
        expand_numeric_range("n{3..2}", 100),
        Err(RangeError::NonAscending { low: 3, high: 2 })
    );
}

#[test]
fn test_span_bounded_by_max_aliases() {
    assert!(expand_numeric_range("n{1..101}", 100).unwrap().len() == 101);
    assert_eq!(
        expand_numeric_range("n{1..102}", 100),
        Err(RangeError::SpanTooLarge { max: 100 })
    );
}

#[test]
fn test_range_values_bounded() {
    assert!(expand_numeric_range("n{9998..9999}", 100).is_ok());
    assert!(matches!(
        expand_numeric_range("n{9999..10000}", 100),
        Err(RangeError::OutOfBounds { .. })
    ));
}

#[test]
fn test_only_one_group_supported() {
    assert_eq!(
        expand_numeric_range("r{1..2}n{3..4}", 100),
        Err(RangeError::TooManyGroups)
    );
}

#[test]
fn test_garbage_inside_braces_rejected() {
    assert!(matches!(
        expand_numeric_range("n{a..b}", 100),
        Err(RangeError::UnexpectedCharacter { .. })
    ));
    assert!(matches!(
        expand_numeric_range("n{1-2}", 100),
        Err(RangeError::UnexpectedCharacter { .. })
    ));
}
