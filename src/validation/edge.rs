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

//! Checkers of edge software jobs and edge reports.

use super::{
    AndChecker, CheckResult, Checker, FnChecker, RegexChecker, StringChoiceChecker,
    UniqueListChecker, each, field,
};
use crate::types::edge::{
    CertReq, DownloadInfo, DownloadSoftwareReq, MEF_EDGE_SOFTWARE, ProgressInfo, SerialNumberReq,
    UpgradeSoftwareReq,
};
use crate::types::node::SoftwareInfo;

pub const URL_PREFIX: &str = "GET https://";
pub const MAX_URL_LENGTH: usize = 512;
const ILLEGAL_URL_CHARS: &[char] = &['\n', '!', '\\', ';', ' ', '&', '$', '<', '>', '`', '|'];

const USER_NAME_PATTERN: &str = r"^[a-zA-Z0-9][a-zA-Z0-9_-]{0,63}$";
const SOFTWARE_VERSION_PATTERN: &str = r"^[a-zA-Z0-9_.-]{0,32}$";
const SOFTWARE_FIELD_PATTERN: &str = r"^[a-zA-Z0-9_.-]{0,64}$";
const CERT_NAME_PATTERN: &str = r"^[a-zA-Z0-9_.-]{1,64}$";
const PROGRESS_RES_PATTERN: &str = r"^[a-zA-Z]{0,32}$";
const PROGRESS_MSG_PATTERN: &str = r"^[\S ]{0,256}$";

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const MAX_PASSWORD_LENGTH: usize = 64;
pub const MAX_SERIAL_NUMBERS: usize = 1024;
pub const MAX_PROGRESS: u8 = 100;
const MAX_SOFTWARE_ENTRIES: usize = 16;

const SOFTWARE_NAMES: &[&str] = &[MEF_EDGE_SOFTWARE];

/// `GET https://...` download address without shell metacharacters.
pub struct UrlChecker;

impl Checker<str> for UrlChecker {
    fn check(&self, value: &str) -> CheckResult {
        if value.len() > MAX_URL_LENGTH {
            return CheckResult::fail(format!("url is longer than {MAX_URL_LENGTH}"));
        }
        let Some(rest) = value.strip_prefix(URL_PREFIX) else {
            return CheckResult::fail(format!("url must start with {URL_PREFIX}"));
        };
        if rest.is_empty() {
            return CheckResult::fail("url has no address");
        }
        if rest.contains(ILLEGAL_URL_CHARS) {
            return CheckResult::fail("url contains illegal characters");
        }
        CheckResult::ok()
    }
}

fn download_info_checker() -> AndChecker<DownloadInfo> {
    AndChecker::new()
        .with(field("package", |d: &DownloadInfo| d.package.as_str(), UrlChecker))
        .with(field("signFile", |d: &DownloadInfo| d.sign_file.as_str(), UrlChecker))
        .with(field("crlFile", |d: &DownloadInfo| d.crl_file.as_str(), UrlChecker))
        .with(field(
            "userName",
            |d: &DownloadInfo| d.user_name.as_str(),
            RegexChecker::new(USER_NAME_PATTERN),
        ))
        .with(FnChecker(|d: &DownloadInfo| {
            if (MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&d.password.len()) {
                CheckResult::ok()
            } else {
                CheckResult::fail("password check failed: length is invalid")
            }
        }))
}

fn serial_numbers_checker() -> UniqueListChecker<String, RegexChecker> {
    UniqueListChecker::new(1, MAX_SERIAL_NUMBERS, RegexChecker::serial_number())
}

pub fn download_checker() -> AndChecker<DownloadSoftwareReq> {
    AndChecker::new()
        .with(field(
            "serialNumbers",
            |r: &DownloadSoftwareReq| &r.serial_numbers,
            serial_numbers_checker(),
        ))
        .with(field(
            "softwareName",
            |r: &DownloadSoftwareReq| r.software_name.as_str(),
            StringChoiceChecker::new(SOFTWARE_NAMES),
        ))
        .with(field(
            "softwareVersion",
            |r: &DownloadSoftwareReq| r.software_version.as_str(),
            RegexChecker::new(SOFTWARE_VERSION_PATTERN),
        ))
        .with(field(
            "downloadInfo",
            |r: &DownloadSoftwareReq| &r.download_info,
            download_info_checker(),
        ))
}

pub fn upgrade_checker() -> AndChecker<UpgradeSoftwareReq> {
    AndChecker::new()
        .with(field(
            "serialNumbers",
            |r: &UpgradeSoftwareReq| &r.serial_numbers,
            serial_numbers_checker(),
        ))
        .with(field(
            "softwareName",
            |r: &UpgradeSoftwareReq| r.software_name.as_str(),
            StringChoiceChecker::new(SOFTWARE_NAMES),
        ))
        .with(field(
            "softwareVersion",
            |r: &UpgradeSoftwareReq| r.software_version.as_str(),
            RegexChecker::new(SOFTWARE_VERSION_PATTERN),
        ))
}

pub fn serial_number_checker() -> AndChecker<SerialNumberReq> {
    AndChecker::new().with(field(
        "serialNumber",
        |r: &SerialNumberReq| r.serial_number.as_str(),
        RegexChecker::serial_number(),
    ))
}

pub fn progress_checker() -> AndChecker<ProgressInfo> {
    AndChecker::new()
        .with(FnChecker(|p: &ProgressInfo| {
            if p.progress <= MAX_PROGRESS {
                CheckResult::ok()
            } else {
                CheckResult::fail(format!("progress {} is not in [0, {MAX_PROGRESS}]", p.progress))
            }
        }))
        .with(field(
            "res",
            |p: &ProgressInfo| p.res.as_str(),
            RegexChecker::new(PROGRESS_RES_PATTERN),
        ))
        .with(field(
            "msg",
            |p: &ProgressInfo| p.msg.as_str(),
            RegexChecker::new(PROGRESS_MSG_PATTERN),
        ))
}

fn software_entry_checker() -> AndChecker<SoftwareInfo> {
    AndChecker::new()
        .with(field(
            "name",
            |s: &SoftwareInfo| s.name.as_str(),
            RegexChecker::new(SOFTWARE_FIELD_PATTERN),
        ))
        .with(field(
            "version",
            |s: &SoftwareInfo| s.version.as_str(),
            RegexChecker::new(SOFTWARE_FIELD_PATTERN),
        ))
        .with(field(
            "inactiveVersion",
            |s: &SoftwareInfo| s.inactive_version.as_str(),
            RegexChecker::new(SOFTWARE_FIELD_PATTERN),
        ))
}

pub fn software_info_checker() -> AndChecker<Vec<SoftwareInfo>> {
    AndChecker::new().with(each(0, MAX_SOFTWARE_ENTRIES, software_entry_checker()))
}

pub fn cert_checker() -> AndChecker<CertReq> {
    AndChecker::new().with(field(
        "certName",
        |r: &CertReq| r.cert_name.as_str(),
        RegexChecker::new(CERT_NAME_PATTERN),
    ))
}
