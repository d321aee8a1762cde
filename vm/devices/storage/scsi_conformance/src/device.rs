// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Device handles and target addressing.

use crate::transport::Connector;
use crate::transport::LoginError;
use crate::transport::Transport;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

const ISCSI_SCHEME: &str = "iscsi://";
const ISCSI_DEFAULT_PORT: u16 = 3260;

/// Where a device handle points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    Iscsi(IscsiUrl),
    /// A local SG_IO device node.
    Local(PathBuf),
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Iscsi(url) => write!(f, "{url}"),
            DeviceTarget::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// A parsed `iscsi://[user[%password]@]host[:port]/target-iqn/lun` URL.
#[derive(Clone, PartialEq, Eq)]
pub struct IscsiUrl {
    pub user: Option<String>,
    pub password: Option<String>,
    pub portal: String,
    pub target: String,
    pub lun: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("url does not start with {ISCSI_SCHEME}")]
    Scheme,
    #[error("url has no target name")]
    MissingTarget,
    #[error("url has no lun")]
    MissingLun,
    #[error("url has an empty portal")]
    MissingPortal,
    #[error("invalid lun {0:?}")]
    InvalidLun(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

impl FromStr for IscsiUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix(ISCSI_SCHEME).ok_or(UrlError::Scheme)?;

        let (credentials, rest) = match rest.rsplit_once('@') {
            Some((creds, rest)) => (Some(creds), rest),
            None => (None, rest),
        };
        let (user, password) = match credentials {
            Some(creds) => match creds.split_once('%') {
                Some((user, password)) => (Some(user.to_owned()), Some(password.to_owned())),
                None => (Some(creds.to_owned()), None),
            },
            None => (None, None),
        };

        let (portal, rest) = rest.split_once('/').ok_or(UrlError::MissingTarget)?;
        if portal.is_empty() {
            return Err(UrlError::MissingPortal);
        }
        let portal = normalize_portal(portal)?;

        let (target, lun) = rest.rsplit_once('/').ok_or(UrlError::MissingLun)?;
        if target.is_empty() {
            return Err(UrlError::MissingTarget);
        }
        if lun.is_empty() {
            return Err(UrlError::MissingLun);
        }
        let lun = lun
            .parse()
            .map_err(|_| UrlError::InvalidLun(lun.to_owned()))?;

        Ok(Self {
            user,
            password,
            portal,
            target: target.to_owned(),
            lun,
        })
    }
}

/// Appends the default port when the portal has none.
fn normalize_portal(portal: &str) -> Result<String, UrlError> {
    // Bracketed IPv6 literals carry colons of their own.
    let port = match portal.rfind(']') {
        Some(close) => portal[close + 1..].strip_prefix(':'),
        None => portal.rsplit_once(':').map(|(_, port)| port),
    };
    match port {
        Some(port) => {
            port.parse::<u16>()
                .map_err(|_| UrlError::InvalidPort(port.to_owned()))?;
            Ok(portal.to_owned())
        }
        None => Ok(format!("{portal}:{ISCSI_DEFAULT_PORT}")),
    }
}

impl fmt::Display for IscsiUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ISCSI_SCHEME}")?;
        if let Some(user) = &self.user {
            write!(f, "{user}")?;
            if self.password.is_some() {
                write!(f, "%****")?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}/{}/{}", self.portal, self.target, self.lun)
    }
}

impl fmt::Debug for IscsiUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IscsiUrl")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("portal", &self.portal)
            .field("target", &self.target)
            .field("lun", &self.lun)
            .finish()
    }
}

/// A handle to one logical unit over one session.
///
/// Every verb takes the handle by `&mut`, so one logical test flow owns it at
/// a time and at most one command is outstanding.
pub struct ScsiDevice {
    target: DeviceTarget,
    transport: Box<dyn Transport>,
    lun: u32,
    error: String,
}

impl fmt::Debug for ScsiDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScsiDevice")
            .field("target", &self.target)
            .field("lun", &self.lun)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl ScsiDevice {
    pub fn new(target: DeviceTarget, transport: Box<dyn Transport>, lun: u32) -> Self {
        Self {
            target,
            transport,
            lun,
            error: String::new(),
        }
    }

    /// Logs in to `url` as `initiator_name` and wraps the session.
    pub fn login(
        connector: &mut dyn Connector,
        initiator_name: &str,
        url: IscsiUrl,
    ) -> Result<Self, LoginError> {
        let session = connector.login(initiator_name, &url)?;
        if session.lun != url.lun {
            tracing::debug!(
                requested = url.lun,
                negotiated = session.lun,
                "target negotiated a different lun"
            );
        }
        tracing::debug!(url = %url, initiator = initiator_name, "logged in");
        Ok(Self::new(
            DeviceTarget::Iscsi(url),
            session.transport,
            session.lun,
        ))
    }

    pub fn lun(&self) -> u32 {
        self.lun
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    /// The text of the last failure on this handle, empty if none.
    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = error.into();
    }

    pub fn clear_error(&mut self) {
        self.error.clear();
    }

    pub(crate) fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}
