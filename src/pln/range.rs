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

//! Numeric range expansion for label names.
//!
//! A label name containing a single `{low..high}` group expands into one
//! alias per integer in `[low, high]`, formatted as the surrounding literal
//! text with the decimal value in between (no zero padding):
//!
//! ```
//! use bstage::pln::expand_numeric_range;
//!
//! let hosts = expand_numeric_range("web{1..3}.example.com", 100).unwrap();
//! assert_eq!(hosts, vec!["web1.example.com", "web2.example.com", "web3.example.com"]);
//! ```
//!
//! The scope is deliberately narrow: one group per name, ascending ranges
//! only, values bounded to four digits.

use thiserror::Error;

/// Largest value accepted on either side of a range.
const MAX_RANGE_VALUE: u32 = 9999;

/// Digits accepted before a range number is rejected outright.
const MAX_DIGITS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("maximum of 1 range group per name")]
    TooManyGroups,

    #[error("unexpected '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    #[error("range {value} too large at position {pos}")]
    TooManyDigits { value: String, pos: usize },

    #[error("number out of bounds: '{value}'")]
    OutOfBounds { value: String },

    #[error("non-ascending range: {low}..{high}")]
    NonAscending { low: u32, high: u32 },

    #[error("maximum range exceeds {max}")]
    SpanTooLarge { max: usize },
}

/// Expand `prefix{low..high}suffix` into aliases, or return the input as a
/// single alias when it contains no range group.
///
/// `max_aliases` bounds the span: `high - low` beyond it is an error.
pub fn expand_numeric_range(input: &str, max_aliases: usize) -> Result<Vec<String>, RangeError> {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut numbers: [String; 2] = [String::new(), String::new()];

    // 0 = prefix, 1 = low, 2 = high, 3 = suffix
    let mut part = 0usize;
    let mut in_range = false;
    let mut saw_group = false;

    let mut chars = input.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' => {
                if saw_group {
                    return Err(RangeError::TooManyGroups);
                }
                in_range = true;
                saw_group = true;
                part = 1;
            }
            '}' => {
                if !in_range {
                    return Err(RangeError::UnexpectedCharacter { ch, pos });
                }
                in_range = false;
                part = 3;
            }
            '.' if in_range => {
                match chars.peek() {
                    Some((_, '.')) => {
                        chars.next();
                        part = 2;
                    }
                    _ => return Err(RangeError::UnexpectedCharacter { ch, pos }),
                }
            }
            '0'..='9' if in_range => {
                let number = &mut numbers[part - 1];
                if number.len() >= MAX_DIGITS {
                    return Err(RangeError::TooManyDigits {
                        value: number.clone(),
                        pos,
                    });
                }
                number.push(ch);
            }
            _ if in_range => return Err(RangeError::UnexpectedCharacter { ch, pos }),
            _ => {
                if part == 0 {
                    prefix.push(ch);
                } else {
                    suffix.push(ch);
                }
            }
        }
    }

    if !saw_group {
        return Ok(vec![input.to_string()]);
    }

    let low = parse_bounded(&numbers[0])?;
    let high = parse_bounded(&numbers[1])?;

    if high <= low {
        return Err(RangeError::NonAscending { low, high });
    }
    if (high - low) as usize > max_aliases {
        return Err(RangeError::SpanTooLarge { max: max_aliases });
    }

    Ok((low..=high)
        .map(|seq| format!("{prefix}{seq}{suffix}"))
        .collect())
}

fn parse_bounded(value: &str) -> Result<u32, RangeError> {
    value
        .parse::<u32>()
        .ok()
        .filter(|v| *v <= MAX_RANGE_VALUE)
        .ok_or_else(|| RangeError::OutOfBounds {
            value: value.to_string(),
        })
}
