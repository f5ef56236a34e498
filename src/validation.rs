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

//! Composable request validators.
//!
//! A checker inspects one value and answers `{result, reason}`. Primitive
//! checkers cover a single field shape; [`AndChecker`] and friends compose
//! them into per-request validators that stop at the first failure.

use std::marker::PhantomData;

pub mod app;
pub mod edge;
pub mod node;
pub mod primitives;

pub use primitives::{
    FloatChecker, IntChecker, Ipv4Checker, PaginationChecker, RegexChecker, StringChoiceChecker,
    UintChecker, UniqueListChecker,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub result: bool,
    pub reason: String,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self {
            result: true,
            reason: String::new(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            result: false,
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result
    }
}

pub trait Checker<T: ?Sized>: Send + Sync {
    fn check(&self, value: &T) -> CheckResult;
}

/// All checkers must pass; the first failure is reported.
pub struct AndChecker<T: ?Sized> {
    checkers: Vec<Box<dyn Checker<T>>>,
}

impl<T: ?Sized> Default for AndChecker<T> {
    fn default() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }
}

impl<T: ?Sized> AndChecker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<C: Checker<T> + 'static>(mut self, checker: C) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }
}

impl<T: ?Sized> Checker<T> for AndChecker<T> {
    fn check(&self, value: &T) -> CheckResult {
        self.checkers
            .iter()
            .map(|c| c.check(value))
            .find(|r| !r.result)
            .unwrap_or_else(CheckResult::ok)
    }
}

/// Applies `inner` to one field of a request, prefixing the field name.
pub struct FieldChecker<T: ?Sized, U: ?Sized, C> {
    name: &'static str,
    get: fn(&T) -> &U,
    inner: C,
}

pub fn field<T: ?Sized, U: ?Sized, C: Checker<U>>(
    name: &'static str,
    get: fn(&T) -> &U,
    inner: C,
) -> FieldChecker<T, U, C> {
    FieldChecker { name, get, inner }
}

impl<T: ?Sized, U: ?Sized, C: Checker<U>> Checker<T> for FieldChecker<T, U, C> {
    fn check(&self, value: &T) -> CheckResult {
        let res = self.inner.check((self.get)(value));
        if res.result {
            res
        } else {
            CheckResult::fail(format!("{} check failed: {}", self.name, res.reason))
        }
    }
}

/// Checks every element of a list whose length lies in `[min, max]`.
pub struct EachChecker<U, C> {
    min: usize,
    max: usize,
    inner: C,
    _marker: PhantomData<fn(&U)>,
}

pub fn each<U, C: Checker<U>>(min: usize, max: usize, inner: C) -> EachChecker<U, C> {
    EachChecker {
        min,
        max,
        inner,
        _marker: PhantomData,
    }
}

impl<U, C: Checker<U>> Checker<Vec<U>> for EachChecker<U, C> {
    fn check(&self, value: &Vec<U>) -> CheckResult {
        if value.len() < self.min || value.len() > self.max {
            return CheckResult::fail(format!(
                "list length {} is not in [{}, {}]",
                value.len(),
                self.min,
                self.max
            ));
        }
        value
            .iter()
            .enumerate()
            .map(|(i, v)| (i, self.inner.check(v)))
            .find(|(_, r)| !r.result)
            .map(|(i, r)| CheckResult::fail(format!("item {} invalid: {}", i, r.reason)))
            .unwrap_or_else(CheckResult::ok)
    }
}

/// Optional field: absent passes unless `required`.
pub struct OptionalChecker<U, C> {
    required: bool,
    inner: C,
    _marker: PhantomData<fn(&U)>,
}

pub fn optional<U, C: Checker<U>>(required: bool, inner: C) -> OptionalChecker<U, C> {
    OptionalChecker {
        required,
        inner,
        _marker: PhantomData,
    }
}

impl<U, C: Checker<U>> Checker<Option<U>> for OptionalChecker<U, C> {
    fn check(&self, value: &Option<U>) -> CheckResult {
        match value {
            Some(v) => self.inner.check(v),
            None if self.required => CheckResult::fail("value is required"),
            None => CheckResult::ok(),
        }
    }
}

/// Ad-hoc rule over a whole value.
pub struct FnChecker<F>(pub F);

impl<T: ?Sized, F> Checker<T> for FnChecker<F>
where
    F: Fn(&T) -> CheckResult + Send + Sync,
{
    fn check(&self, value: &T) -> CheckResult {
        (self.0)(value)
    }
}
