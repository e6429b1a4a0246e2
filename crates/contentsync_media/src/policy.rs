use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::MediaError;

const LOCAL_SUFFIXES: [&str; 2] = [".local", ".test"];

/// Decides which hosts attachment downloads may reach.
///
/// Loopback, private, link-local and unspecified addresses, `localhost`, and
/// the reserved `.local` / `.test` names are treated as non-external and
/// refused. `allow_local_sync` relaxes the rule for `.local` / `.test` names
/// only; `trusted_hosts` lists hosts that are always reachable (typically the
/// destination's own host).
#[derive(Debug, Clone, Default)]
pub struct OutboundPolicy {
    allow_local_sync: bool,
    trusted_hosts: Vec<String>,
}

impl OutboundPolicy {
    pub fn new(allow_local_sync: bool) -> Self {
        Self {
            allow_local_sync,
            trusted_hosts: Vec::new(),
        }
    }

    pub fn with_trusted_host(mut self, host: impl Into<String>) -> Self {
        self.trusted_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    pub fn allows_local_sync(&self) -> bool {
        self.allow_local_sync
    }

    pub fn check(&self, raw: &str) -> Result<Url, MediaError> {
        let url = Url::parse(raw).map_err(|source| MediaError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        self.check_url(&url)?;
        Ok(url)
    }

    pub fn check_url(&self, url: &Url) -> Result<(), MediaError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MediaError::UnsupportedScheme(url.scheme().to_string()));
        }

        let host = url
            .host()
            .ok_or_else(|| MediaError::BlockedHost(url.to_string()))?;
        if self.is_external_host(&host) {
            Ok(())
        } else {
            Err(MediaError::BlockedHost(host.to_string()))
        }
    }

    pub fn is_external_host(&self, host: &Host<&str>) -> bool {
        let rendered = host.to_string().to_ascii_lowercase();
        if self.trusted_hosts.iter().any(|trusted| *trusted == rendered) {
            return true;
        }

        match host {
            Host::Ipv4(ip) => is_public_v4(ip),
            Host::Ipv6(ip) => is_public_v6(ip),
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if domain == "localhost" || domain.ends_with(".localhost") {
                    false
                } else if LOCAL_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix)) {
                    self.allow_local_sync
                } else {
                    true
                }
            }
        }
    }
}

fn is_public_v4(ip: &Ipv4Addr) -> bool {
    !(ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast())
}

fn is_public_v6(ip: &Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_public_v4(&mapped);
    }
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    !(ip.is_loopback() || ip.is_unspecified() || unique_local || link_local)
}
