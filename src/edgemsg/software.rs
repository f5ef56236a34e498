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

use super::{EdgeMsgService, Error, RefusedSnafu, Result, check, peer_sn};
use crate::bus::{Message, OK, Operation, PeerInfo, RES_EDGE_DOWNLOAD_INFO, RES_EDGE_UPGRADE_INFO};
use crate::types::edge::{
    DownloadSoftwareReq, EdgeBatchResp, EdgeDownloadContent, ProgressInfo, SerialNumberReq,
    UpgradeSoftwareReq,
};
use crate::types::node::SoftwareInfo;
use crate::validation::edge::{
    download_checker, progress_checker, serial_number_checker, upgrade_checker,
};
use snafu::ensure;
use tracing::{info, warn};

impl EdgeMsgService {
    /// Sends a job message to edge `sn` and waits for its `OK`.
    async fn push(&self, sn: &str, msg: Message) -> Result<()> {
        let reply = self
            .bus
            .send_sync(msg.with_sync(true), self.config.response_timeout())
            .await?;
        ensure!(
            reply.content == serde_json::json!(OK),
            RefusedSnafu {
                sn,
                answer: reply.content.to_string(),
            }
        );
        Ok(())
    }

    /// Hands the package to every edge. The request and every message built
    /// from it wipe the credentials when dropped.
    pub async fn download_software(&self, req: DownloadSoftwareReq) -> Result<EdgeBatchResp> {
        check(&download_checker(), &req)?;

        let mut res = EdgeBatchResp::default();
        for sn in &req.serial_numbers {
            self.progress.reset(sn);
            let content = EdgeDownloadContent {
                serial_number: sn.clone(),
                software_name: req.software_name.clone(),
                software_version: req.software_version.clone(),
                download_info: req.download_info.clone(),
            };
            let sent = match Message::to_edge(sn, Operation::Update, RES_EDGE_DOWNLOAD_INFO)
                .with_secret()
                .with_content(&content)
            {
                Ok(msg) => self.push(sn, msg).await,
                Err(e) => Err(e.into()),
            };
            match sent {
                Ok(()) => {
                    info!("download of {} sent to edge {}", req.software_name, sn);
                    res.succeed(sn);
                }
                Err(e) => {
                    warn!("send download of {} to edge {} failed: {}", req.software_name, sn, e);
                    res.fail(sn, e.to_string());
                }
            }
        }
        Ok(res)
    }

    pub async fn upgrade_software(&self, req: &UpgradeSoftwareReq) -> Result<EdgeBatchResp> {
        check(&upgrade_checker(), req)?;

        let mut res = EdgeBatchResp::default();
        for sn in &req.serial_numbers {
            let content = UpgradeSoftwareReq {
                serial_numbers: vec![sn.clone()],
                software_name: req.software_name.clone(),
                software_version: req.software_version.clone(),
            };
            let msg = Message::to_edge(sn, Operation::Update, RES_EDGE_UPGRADE_INFO)
                .with_content(&content)?;
            match self.push(sn, msg).await {
                Ok(()) => {
                    self.progress.reset(sn);
                    info!("upgrade of {} sent to edge {}", req.software_name, sn);
                    res.succeed(sn);
                }
                Err(e) => {
                    warn!("send upgrade of {} to edge {} failed: {}", req.software_name, sn, e);
                    res.fail(sn, e.to_string());
                }
            }
        }
        Ok(res)
    }

    pub fn query_progress(&self, req: &SerialNumberReq) -> Result<ProgressInfo> {
        check(&serial_number_checker(), req)?;
        self.progress
            .get(&req.serial_number)
            .ok_or_else(|| Error::ProgressNotFound {
                sn: req.serial_number.clone(),
            })
    }

    pub async fn query_version(&self, req: &SerialNumberReq) -> Result<Vec<SoftwareInfo>> {
        check(&serial_number_checker(), req)?;
        Ok(self.nodes.node_software_info(&req.serial_number).await?)
    }

    /// Edge report; the serial number comes from the session, not the body.
    pub fn report_progress(&self, peer: Option<&PeerInfo>, report: &ProgressInfo) -> Result<()> {
        let sn = peer_sn(peer)?;
        check(&progress_checker(), report)?;
        self.progress.set(sn, report.clone());
        Ok(())
    }
}
