use std::{collections::HashSet, net::SocketAddr, path::Path};

use crate::SwcacheConfig;

/// Validation output for a loaded configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    /// Returns true when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a configuration and return a report of issues.
pub fn validate(cfg: &SwcacheConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_upstream(cfg, &mut report);
    validate_cache(cfg, &mut report);

    report
}

fn validate_server(cfg: &SwcacheConfig, report: &mut ConfigReport) {
    let server = &cfg.server;

    if server.listen.trim().is_empty() {
        report.error("server.listen is empty");
    } else if server.listen.parse::<SocketAddr>().is_err() {
        report.warn(format!(
            "server.listen '{listen}' is not a socket address; DNS resolution will be used",
            listen = server.listen
        ));
    }

    if !server.control_path.starts_with('/') {
        report.error(format!(
            "server.control_path '{path}' must start with '/'",
            path = server.control_path
        ));
    }
}

fn validate_upstream(cfg: &SwcacheConfig, report: &mut ConfigReport) {
    let origin = cfg.upstream.origin.trim();

    if origin.is_empty() {
        report.error("upstream.origin is empty");
        return;
    }

    match origin.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
        _ => report.error(format!(
            "upstream.origin '{origin}' must be in 'host:port' form"
        )),
    }

    if origin == cfg.server.listen.trim() {
        report.error(format!(
            "upstream.origin '{origin}' points back at server.listen"
        ));
    }
}

fn validate_cache(cfg: &SwcacheConfig, report: &mut ConfigReport) {
    let cache = &cfg.cache;

    if cache.version.trim().is_empty() {
        report.error("cache.version is empty; partition names would collide across deployments");
    } else if !cache
        .version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        report.error(format!(
            "cache.version '{}' may only contain ASCII letters, digits, '-', '_' and '.'",
            cache.version
        ));
    }

    if cache.critical_resources.is_empty() {
        report.warn("cache.critical_resources is empty; install will store nothing");
    }

    let mut seen = HashSet::new();
    for url in cache
        .critical_resources
        .iter()
        .chain(cache.lazy_resources.iter())
    {
        if !url.starts_with('/') {
            report.error(format!("cache resource '{url}' must start with '/'"));
        }
        if !seen.insert(url.as_str()) {
            report.warn(format!("cache resource '{url}' is listed more than once"));
        }
    }

    if let Some(cache_dir) = cache.cache_dir.as_deref() {
        let cache_path = Path::new(cache_dir);
        if cache_path.exists() {
            if !cache_path.is_dir() {
                report.error(format!(
                    "cache.cache_dir '{cache_dir}' exists but is not a directory"
                ));
            }
        } else {
            report.warn(format!(
                "cache.cache_dir '{cache_dir}' does not exist; it will be created at runtime"
            ));
        }
    }
}
