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

use crate::types::error::{self, Error};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

const MIB: f64 = 1024.0 * 1024.0;
// float noise from summing fractional cpu requests
const CPU_EPSILON: f64 = 1e-9;

/// cpu in cores, memory in MiB, npu in devices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: i64,
    #[serde(default)]
    pub npu: i64,
}

impl Add for Resources {
    type Output = Resources;

    fn add(self, rhs: Resources) -> Resources {
        Resources {
            cpu: self.cpu + rhs.cpu,
            memory: self.memory + rhs.memory,
            npu: self.npu + rhs.npu,
        }
    }
}

impl Sub for Resources {
    type Output = Resources;

    /// Saturates at zero: accounting never goes negative.
    fn sub(self, rhs: Resources) -> Resources {
        Resources {
            cpu: (self.cpu - rhs.cpu).max(0.0),
            memory: (self.memory - rhs.memory).max(0),
            npu: (self.npu - rhs.npu).max(0),
        }
    }
}

impl Resources {
    /// Name of the first resource in `request` that does not fit into `self`.
    pub fn shortage(&self, request: &Resources) -> Option<&'static str> {
        if request.cpu > self.cpu + CPU_EPSILON {
            return Some("cpu");
        }
        if request.memory > self.memory {
            return Some("memory");
        }
        if request.npu > self.npu {
            return Some("npu");
        }
        None
    }
}

/// Parses a substrate quantity string ("500m", "16Gi", "2") into base units.
pub fn parse_quantity(value: &str) -> Result<f64, Error> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);

    let number: f64 = number.parse().map_err(|_| Error::InvalidQuantity {
        value: value.to_string(),
    })?;

    let multiplier = match suffix {
        "" => 1.0,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => MIB,
        "Gi" => MIB * 1024.0,
        "Ti" => MIB * 1024.0 * 1024.0,
        "Pi" => MIB * 1024.0 * 1024.0 * 1024.0,
        "Ei" => MIB * 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => {
            return error::InvalidQuantitySnafu {
                value: value.to_string(),
            }
            .fail();
        }
    };

    Ok(number * multiplier)
}

pub fn cpu_cores(q: &Quantity) -> Result<f64, Error> {
    parse_quantity(&q.0)
}

pub fn memory_mib(q: &Quantity) -> Result<i64, Error> {
    Ok((parse_quantity(&q.0)? / MIB).floor() as i64)
}

pub fn device_count(q: &Quantity) -> Result<i64, Error> {
    Ok(parse_quantity(&q.0)?.floor() as i64)
}

/// Quantity string used in pod specs for a MiB amount.
pub fn mib_quantity(mib: i64) -> Quantity {
    Quantity(format!("{mib}Mi"))
}

pub fn cpu_quantity(cores: f64) -> Quantity {
    let milli = (cores * 1000.0).round() as i64;
    if milli % 1000 == 0 {
        Quantity(format!("{}", milli / 1000))
    } else {
        Quantity(format!("{milli}m"))
    }
}
