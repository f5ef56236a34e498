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

//! Software jobs pushed to edges, their progress, and what edges ask for
//! at startup (certificates and registry configuration).

use crate::bus::{self, MessageBus, PeerInfo};
use crate::config::Config;
use crate::inner::{self, NodeInner};
use crate::types::{IntoStatus, Status};
use crate::validation::{CheckResult, Checker};
use snafu::{Snafu, ensure};
use std::sync::Arc;

pub mod certs;
pub mod progress;
pub mod software;

pub use certs::{CertCache, CertProvider, FileCertProvider};
pub use progress::ProgressCache;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}", reason))]
    Param { reason: String },

    #[snafu(display("message carries no edge identity"))]
    MissingPeer,

    #[snafu(display("no progress recorded for {}", sn))]
    ProgressNotFound { sn: String },

    #[snafu(display("image registry address is not configured"))]
    NoConfig,

    #[snafu(display("edge {} refused the job: {}", sn, answer))]
    Refused { sn: String, answer: String },

    #[snafu(transparent)]
    Certificate { source: certs::Error },

    #[snafu(transparent)]
    Bus { source: bus::Error },

    #[snafu(transparent)]
    Inner { source: inner::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl IntoStatus for Error {
    fn status(&self, failure: Status) -> Status {
        match self {
            Error::Param { .. } | Error::MissingPeer => Status::ErrorParamInvalid,
            Error::NoConfig => Status::ErrorGetConfigData,
            Error::Certificate { .. } => Status::ErrorQueryCrt,
            Error::Bus {
                source: bus::Error::Encode { .. },
            } => Status::ErrorNewMsg,
            Error::Bus { .. } | Error::Refused { .. } => Status::ErrorSendMsgToNode,
            _ => failure,
        }
    }
}

pub(crate) fn check<T: ?Sized>(checker: &impl Checker<T>, value: &T) -> Result<()> {
    let CheckResult { result, reason } = checker.check(value);
    ensure!(result, ParamSnafu { reason });
    Ok(())
}

/// Serial number of the edge a report came from.
pub(crate) fn peer_sn(peer: Option<&PeerInfo>) -> Result<&str> {
    peer.map(|p| p.sn.as_str())
        .filter(|sn| !sn.is_empty())
        .ok_or(Error::MissingPeer)
}

pub struct EdgeMsgService {
    config: Arc<Config>,
    bus: Arc<dyn MessageBus>,
    nodes: Arc<dyn NodeInner>,
    progress: Arc<ProgressCache>,
    certs: CertCache,
}

impl EdgeMsgService {
    pub fn new(
        config: Arc<Config>,
        bus: Arc<dyn MessageBus>,
        nodes: Arc<dyn NodeInner>,
        progress: Arc<ProgressCache>,
        certs: CertCache,
    ) -> Self {
        Self {
            config,
            bus,
            nodes,
            progress,
            certs,
        }
    }

    pub fn progress(&self) -> Arc<ProgressCache> {
        self.progress.clone()
    }
}
