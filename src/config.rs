//! Caller-facing configuration for one client session.

/// Forward proxy address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ProxyConfig {
            host: host.into(),
            port,
        }
    }
}

/// One request target: host, port and whether the hop to it is TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Target {
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Host` header value; the default port for the scheme is omitted.
    pub fn host_header(&self) -> String {
        if self.port == self.default_port() {
            self.host.clone()
        } else {
            self.authority()
        }
    }

    pub(crate) fn default_port(&self) -> u16 {
        if self.tls {
            443
        } else {
            80
        }
    }
}

/// Everything the caller can tune on a session. Credentials are configured
/// separately through [`crate::Client::set_credential`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub proxy: Option<ProxyConfig>,
    /// Follow 3xx responses instead of returning them.
    pub follow_redirects: bool,
    /// Hop budget for one redirect chain.
    pub max_redirects: usize,
    /// Rewrite non-GET/HEAD methods to GET on a 302, like most clients do.
    /// 303 always rewrites; 307/308 never do.
    pub downgrade_302: bool,
    /// Requests served over one connection before it is retired.
    pub keep_alive_max: u32,
    /// Write a whole batch before reading any response.
    pub pipelining: bool,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientConfig {
            host: host.into(),
            port,
            tls: false,
            proxy: None,
            follow_redirects: false,
            max_redirects: 10,
            downgrade_302: true,
            keep_alive_max: 100,
            pipelining: false,
        }
    }

    pub fn with_tls(mut self, on: bool) -> Self {
        self.tls = on;
        self
    }

    pub fn with_proxy(mut self, host: impl Into<String>, port: u16) -> Self {
        self.proxy = Some(ProxyConfig::new(host, port));
        self
    }

    pub fn with_follow_redirects(mut self, on: bool) -> Self {
        self.follow_redirects = on;
        self
    }

    pub fn with_max_redirects(mut self, n: usize) -> Self {
        self.max_redirects = n;
        self
    }

    pub fn with_downgrade_302(mut self, on: bool) -> Self {
        self.downgrade_302 = on;
        self
    }

    pub fn with_keep_alive_max(mut self, n: u32) -> Self {
        self.keep_alive_max = n;
        self
    }

    pub fn with_pipelining(mut self, on: bool) -> Self {
        self.pipelining = on;
        self
    }

    pub(crate) fn target(&self) -> Target {
        Target {
            host: self.host.clone(),
            port: self.port,
            tls: self.tls,
        }
    }
}
