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

//! Root certificates handed to edges, and the registry address they pull from.

use super::{EdgeMsgService, NoConfigSnafu, check, peer_sn};
use crate::bus::{Message, Operation, PeerInfo, RES_CONFIG, RES_EDGE_CERT};
use crate::types::edge::{CertInfo, CertReq, ConfigInfo};
use crate::validation::edge::cert_checker;
use async_trait::async_trait;
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use snafu::{ResultExt, Snafu, ensure};
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

#[derive(Snafu, Debug)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("read certificate {} failed: {}", path.display(), source))]
    Read { path: PathBuf, source: io::Error },

    #[snafu(display("parse certificate error"))]
    InvalidCertificate { source: io::Error },

    #[snafu(display("no certificate"))]
    NonCertificate,

    #[snafu(display("certificate is not a usable trust anchor: {}", source))]
    Untrusted { source: webpki::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// load certificates from PEM file
fn load_certs(cert: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut Cursor::new(cert))
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .context(InvalidCertificateSnafu)?;

    if certs.is_empty() {
        return NonCertificateSnafu.fail();
    }

    Ok(certs)
}

fn fingerprint(cert: &CertificateDer<'_>) -> String {
    Sha256::digest(cert.as_ref())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Parses a PEM bundle into what an edge receives. The first certificate
/// must be usable as a trust anchor.
pub fn cert_info(name: &str, pem: &str) -> Result<CertInfo> {
    let certs = load_certs(pem.as_bytes())?;
    webpki::anchor_from_trusted_cert(&certs[0]).context(UntrustedSnafu)?;
    Ok(CertInfo {
        cert_name: name.to_string(),
        cert: pem.to_string(),
        fingerprint: fingerprint(&certs[0]),
    })
}

#[async_trait]
pub trait CertProvider: Send + Sync {
    async fn load(&self, name: &str) -> Result<CertInfo>;
}

/// Reads `<dir>/<name>.crt`.
pub struct FileCertProvider {
    dir: PathBuf,
}

impl FileCertProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl CertProvider for FileCertProvider {
    async fn load(&self, name: &str) -> Result<CertInfo> {
        let path = self.dir.join(format!("{name}.crt"));
        let pem = tokio::fs::read_to_string(&path)
            .await
            .context(ReadSnafu { path: path.clone() })?;
        cert_info(name, &pem)
    }
}

/// Loaded certificates by name. Filled on first request.
pub struct CertCache {
    provider: Arc<dyn CertProvider>,
    loaded: RwLock<HashMap<String, CertInfo>>,
}

impl CertCache {
    pub fn new(provider: Arc<dyn CertProvider>) -> Self {
        Self {
            provider,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, name: &str) -> Result<CertInfo> {
        let cached = self
            .loaded
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned();
        if let Some(info) = cached {
            return Ok(info);
        }

        let info = self.provider.load(name).await?;
        self.loaded
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), info.clone());
        Ok(info)
    }

    /// Forgets `name`, so the next request reads it again.
    #[cfg(test)]
    fn invalidate(&self, name: &str) {
        self.loaded
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(name);
    }
}

impl EdgeMsgService {
    /// Answers an edge's certificate request with a message back to it.
    pub async fn get_cert(&self, peer: Option<&PeerInfo>, req: &CertReq) -> super::Result<()> {
        let sn = peer_sn(peer)?;
        check(&cert_checker(), req)?;

        let info = match self.certs.get(&req.cert_name).await {
            Ok(info) => info,
            Err(e) => {
                warn!("query cert {} for edge {} failed: {}", req.cert_name, sn, e);
                return Err(e.into());
            }
        };
        let msg = Message::to_edge(sn, Operation::Update, RES_EDGE_CERT).with_content(&info)?;
        self.bus.send(msg).await?;
        info!("cert {} sent to edge {}", req.cert_name, sn);
        Ok(())
    }

    pub async fn get_config(&self, peer: Option<&PeerInfo>) -> super::Result<()> {
        let sn = peer_sn(peer)?;
        ensure!(!self.config.image_registry.is_empty(), NoConfigSnafu);

        let config = ConfigInfo {
            image_address: self.config.image_registry.clone(),
        };
        let msg = Message::to_edge(sn, Operation::Update, RES_CONFIG).with_content(&config)?;
        self.bus.send(msg).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{harness, harness_with};
    use super::*;
    use crate::config::Config;
    use crate::tests::CA_PEM;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn peer() -> PeerInfo {
        PeerInfo {
            sn: "SN1".to_string(),
            ip: "10.0.0.1".to_string(),
        }
    }

    struct CountingProvider(AtomicUsize);

    #[async_trait]
    impl CertProvider for CountingProvider {
        async fn load(&self, name: &str) -> Result<CertInfo> {
            self.0.fetch_add(1, Ordering::SeqCst);
            cert_info(name, CA_PEM)
        }
    }

    // Test 1: a PEM bundle yields its text and a stable fingerprint
    #[test]
    fn test_cert_info() {
        let info = cert_info("root", CA_PEM).expect("parse");
        assert_eq!(info.cert_name, "root");
        assert_eq!(info.fingerprint.len(), 64);
        assert_eq!(info.fingerprint, cert_info("root", CA_PEM).expect("parse").fingerprint);

        assert!(matches!(cert_info("root", ""), Err(Error::NonCertificate)));
    }

    // Test 2: the cache asks the provider once per name
    #[tokio::test]
    async fn test_cache_loads_once() {
        let provider = Arc::new(CountingProvider(AtomicUsize::new(0)));
        let cache = CertCache::new(provider.clone());
        cache.get("root").await.expect("first");
        cache.get("root").await.expect("second");
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        cache.invalidate("root");
        cache.get("root").await.expect("reload");
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);
    }

    // Test 3: a requested cert is read from disk and pushed to the edge
    #[tokio::test]
    async fn test_get_cert_sends_to_edge() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("root.crt"), CA_PEM).expect("write");
        let h = harness_with(Config::default(), dir.path());
        let mut edge = h.bus.connect("SN1", "10.0.0.1").await;

        let req = CertReq {
            cert_name: "root".to_string(),
        };
        h.service.get_cert(Some(&peer()), &req).await.expect("cert");

        let delivery = edge.recv().await.expect("delivery");
        assert_eq!(delivery.message.router.resource, RES_EDGE_CERT);
        let sent: CertInfo = delivery.message.content_as().expect("decode");
        assert_eq!(sent.cert_name, "root");
        assert!(sent.cert.contains("BEGIN CERTIFICATE"));
    }

    // Test 4: missing files and bad names are errors, nothing is sent
    #[tokio::test]
    async fn test_get_cert_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let h = harness_with(Config::default(), dir.path());

        let missing = CertReq {
            cert_name: "absent".to_string(),
        };
        let err = h.service.get_cert(Some(&peer()), &missing).await.expect_err("missing");
        assert!(matches!(err, super::super::Error::Certificate { .. }));

        let bad = CertReq {
            cert_name: "../etc/passwd".to_string(),
        };
        let err = h.service.get_cert(Some(&peer()), &bad).await.expect_err("bad name");
        assert!(matches!(err, super::super::Error::Param { .. }));
    }

    // Test 5: the registry address is sent only when configured
    #[tokio::test]
    async fn test_get_config() {
        let h = harness();
        let err = h.service.get_config(Some(&peer())).await.expect_err("empty");
        assert!(matches!(err, super::super::Error::NoConfig));

        let config = Config {
            image_registry: "registry.example.com:5000".to_string(),
            ..Config::default()
        };
        let h = harness_with(config, std::path::Path::new("/nonexistent"));
        let mut edge = h.bus.connect("SN1", "10.0.0.1").await;
        h.service.get_config(Some(&peer())).await.expect("config");

        let delivery = edge.recv().await.expect("delivery");
        assert_eq!(delivery.message.router.resource, RES_CONFIG);
        assert_eq!(delivery.message.content["imageAddress"], "registry.example.com:5000");
    }
}
