// Copyright 2025 RustFS Team
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

use super::{CheckResult, Checker};
use crate::types::node::ListReq;
use regex::Regex;
use std::collections::HashSet;
use std::hash::Hash;
use std::marker::PhantomData;
use std::net::Ipv4Addr;

pub const MIN_PAGE_SIZE: u64 = 1;
pub const MAX_PAGE_SIZE: u64 = 100;
/// Largest accepted identifier.
pub const MAX_ID: u64 = 1 << 32;

pub const SERIAL_NUMBER_PATTERN: &str = r"^[a-zA-Z0-9]([-_a-zA-Z0-9]{0,62}[a-zA-Z0-9])?$";
const PAGINATION_NAME_PATTERN: &str = r"^[\S]{0,253}$";

/// Inclusive bounds on an unsigned value.
#[derive(Debug, Clone, Copy)]
pub struct UintChecker {
    min: u64,
    max: u64,
}

impl UintChecker {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    /// Identifier bounds: zero and values above 2^32 are rejected.
    pub fn id() -> Self {
        Self::new(1, MAX_ID)
    }
}

impl Checker<u64> for UintChecker {
    fn check(&self, value: &u64) -> CheckResult {
        if *value < self.min || *value > self.max {
            CheckResult::fail(format!(
                "value {} is not in [{}, {}]",
                value, self.min, self.max
            ))
        } else {
            CheckResult::ok()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntChecker {
    min: i64,
    max: i64,
}

impl IntChecker {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }
}

impl Checker<i64> for IntChecker {
    fn check(&self, value: &i64) -> CheckResult {
        if *value < self.min || *value > self.max {
            CheckResult::fail(format!(
                "value {} is not in [{}, {}]",
                value, self.min, self.max
            ))
        } else {
            CheckResult::ok()
        }
    }
}

impl Checker<i32> for IntChecker {
    fn check(&self, value: &i32) -> CheckResult {
        Checker::<i64>::check(self, &i64::from(*value))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FloatChecker {
    min: f64,
    max: f64,
}

impl FloatChecker {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Checker<f64> for FloatChecker {
    fn check(&self, value: &f64) -> CheckResult {
        if !value.is_finite() || *value < self.min || *value > self.max {
            CheckResult::fail(format!(
                "value {} is not in [{}, {}]",
                value, self.min, self.max
            ))
        } else {
            CheckResult::ok()
        }
    }
}

/// Anchored regular expression match.
#[derive(Debug, Clone)]
pub struct RegexChecker {
    pattern: &'static str,
    regex: Option<Regex>,
}

impl RegexChecker {
    pub fn new(pattern: &'static str) -> Self {
        Self {
            pattern,
            regex: Regex::new(pattern).ok(),
        }
    }

    pub fn serial_number() -> Self {
        Self::new(SERIAL_NUMBER_PATTERN)
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(value))
    }
}

impl Checker<str> for RegexChecker {
    fn check(&self, value: &str) -> CheckResult {
        if self.is_match(value) {
            CheckResult::ok()
        } else {
            CheckResult::fail(format!("value does not match {}", self.pattern))
        }
    }
}

impl Checker<String> for RegexChecker {
    fn check(&self, value: &String) -> CheckResult {
        Checker::<str>::check(self, value.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct StringChoiceChecker {
    choices: &'static [&'static str],
}

impl StringChoiceChecker {
    pub fn new(choices: &'static [&'static str]) -> Self {
        Self { choices }
    }
}

impl Checker<str> for StringChoiceChecker {
    fn check(&self, value: &str) -> CheckResult {
        if self.choices.contains(&value) {
            CheckResult::ok()
        } else {
            CheckResult::fail(format!("value {} is not one of {:?}", value, self.choices))
        }
    }
}

impl Checker<String> for StringChoiceChecker {
    fn check(&self, value: &String) -> CheckResult {
        Checker::<str>::check(self, value.as_str())
    }
}

/// Unicast IPv4 address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ipv4Checker;

impl Checker<str> for Ipv4Checker {
    fn check(&self, value: &str) -> CheckResult {
        match value.parse::<Ipv4Addr>() {
            Ok(ip) if ip.is_unspecified() || ip.is_broadcast() => {
                CheckResult::fail(format!("ip {} is not allowed", value))
            }
            Ok(_) => CheckResult::ok(),
            Err(_) => CheckResult::fail(format!("{} is not an ipv4 address", value)),
        }
    }
}

impl Checker<String> for Ipv4Checker {
    fn check(&self, value: &String) -> CheckResult {
        Checker::<str>::check(self, value.as_str())
    }
}

/// Bounded list with pairwise-unique elements, each passing `inner`.
pub struct UniqueListChecker<U, C> {
    min: usize,
    max: usize,
    inner: C,
    _marker: PhantomData<fn(&U)>,
}

impl<U, C: Checker<U>> UniqueListChecker<U, C> {
    pub fn new(min: usize, max: usize, inner: C) -> Self {
        Self {
            min,
            max,
            inner,
            _marker: PhantomData,
        }
    }
}

impl<U, C> Checker<Vec<U>> for UniqueListChecker<U, C>
where
    U: Eq + Hash + std::fmt::Debug,
    C: Checker<U>,
{
    fn check(&self, value: &Vec<U>) -> CheckResult {
        if value.len() < self.min || value.len() > self.max {
            return CheckResult::fail(format!(
                "list length {} is not in [{}, {}]",
                value.len(),
                self.min,
                self.max
            ));
        }

        let mut seen = HashSet::with_capacity(value.len());
        for item in value {
            if !seen.insert(item) {
                return CheckResult::fail(format!("duplicate item {:?}", item));
            }
            let res = self.inner.check(item);
            if !res.result {
                return res;
            }
        }
        CheckResult::ok()
    }
}

pub struct PaginationChecker {
    name: RegexChecker,
}

impl Default for PaginationChecker {
    fn default() -> Self {
        Self {
            name: RegexChecker::new(PAGINATION_NAME_PATTERN),
        }
    }
}

impl Checker<ListReq> for PaginationChecker {
    fn check(&self, value: &ListReq) -> CheckResult {
        if value.page_num < 1 || value.page_num > MAX_ID {
            return CheckResult::fail(format!("pageNum {} is invalid", value.page_num));
        }
        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&value.page_size) {
            return CheckResult::fail(format!(
                "pageSize {} is not in [{}, {}]",
                value.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            ));
        }
        if let Some(name) = &value.name {
            let res = self.name.check(name);
            if !res.result {
                return CheckResult::fail(format!("name check failed: {}", res.reason));
            }
        }
        CheckResult::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: id bounds
    #[test]
    fn test_id_checker() {
        let ids = UintChecker::id();
        assert!(!ids.check(&0).result, "zero id rejected");
        assert!(ids.check(&1).result);
        assert!(ids.check(&MAX_ID).result);
        assert!(!ids.check(&(MAX_ID + 1)).result);
    }

    // Test 2: pagination boundaries
    #[test]
    fn test_pagination_boundaries() {
        let checker = PaginationChecker::default();
        let page = |size| ListReq {
            page_num: 1,
            page_size: size,
            name: None,
        };
        assert!(checker.check(&page(1)).result, "pageSize=1 accepted");
        assert!(checker.check(&page(100)).result, "pageSize=100 accepted");
        assert!(!checker.check(&page(0)).result, "pageSize=0 rejected");
        assert!(!checker.check(&page(101)).result, "pageSize=101 rejected");

        let zero_page = ListReq {
            page_num: 0,
            ..page(10)
        };
        assert!(!checker.check(&zero_page).result, "pageNum=0 rejected");

        let spaced = ListReq {
            name: Some("a b".into()),
            ..page(10)
        };
        assert!(!checker.check(&spaced).result, "names cannot contain spaces");
    }

    // Test 3: unique list rejects repeats and bad elements
    #[test]
    fn test_unique_list_checker() {
        let checker = UniqueListChecker::new(1, 3, RegexChecker::serial_number());
        assert!(checker.check(&vec!["SN1".to_string(), "SN2".to_string()]).result);
        assert!(!checker.check(&vec!["SN1".to_string(), "SN1".to_string()]).result);
        assert!(!checker.check(&vec!["-SN1".to_string()]).result);
        assert!(!checker.check(&Vec::<String>::new()).result);
    }

    // Test 4: host ip shape
    #[test]
    fn test_ipv4_checker() {
        assert!(Checker::<str>::check(&Ipv4Checker, "127.0.0.1").result);
        assert!(!Checker::<str>::check(&Ipv4Checker, "0.0.0.0").result);
        assert!(!Checker::<str>::check(&Ipv4Checker, "255.255.255.255").result);
        assert!(!Checker::<str>::check(&Ipv4Checker, "").result);
        assert!(!Checker::<str>::check(&Ipv4Checker, "::1").result);
    }

    // Test 5: serial numbers
    #[test]
    fn test_serial_number_pattern() {
        let sn = RegexChecker::serial_number();
        assert!(sn.is_match("2102312NSF10K8000130"));
        assert!(!sn.is_match("_2102312NSF10K8000130"));
        assert!(!sn.is_match("2102312NSF10K8000130-"));
        assert!(!sn.is_match("21!invalid$"));
        assert!(!sn.is_match(&"a".repeat(65)));
        assert!(sn.is_match(&"a".repeat(64)));
    }
}
