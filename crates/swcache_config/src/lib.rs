use serde::Deserialize;

pub mod validation;

pub use validation::{ConfigReport, validate};

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    /// Upper bound on concurrently served client connections.
    pub max_connections: u16,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            max_connections: 1024,
        }
    }
}

impl GlobalConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn max_connections(&self) -> u16 {
        self.max_connections
    }
}

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    /// Path that accepts JSON control messages (`POST`).
    pub control_path: String,
    pub keepalive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            control_path: "/__swcache/message".into(),
            keepalive: true,
        }
    }
}

impl ServerConfig {
    pub fn listen(&self) -> &str {
        &self.listen
    }

    pub fn control_path(&self) -> &str {
        &self.control_path
    }

    pub fn keepalive(&self) -> bool {
        self.keepalive
    }
}

// =======================================================
// UPSTREAM (ORIGIN) CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origin address, "host:port".
    pub origin: String,
    /// `Host` header sent to the origin. Defaults to `origin`.
    pub host_header: Option<String>,
    pub connect_timeout_secs: u64,
    /// 0 disables the read timeout.
    pub read_timeout_secs: u64,
    pub max_response_headers_bytes: u64,
    pub max_response_body_bytes: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "127.0.0.1:3000".into(),
            host_header: None,
            connect_timeout_secs: 5,
            read_timeout_secs: 0,
            max_response_headers_bytes: 64 * 1024,
            max_response_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl UpstreamConfig {
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn host_header(&self) -> &str {
        self.host_header.as_deref().unwrap_or(&self.origin)
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    pub fn read_timeout_secs(&self) -> Option<u64> {
        (self.read_timeout_secs > 0).then_some(self.read_timeout_secs)
    }

    pub fn max_response_headers_bytes(&self) -> u64 {
        self.max_response_headers_bytes
    }

    pub fn max_response_body_bytes(&self) -> u64 {
        self.max_response_body_bytes
    }

    /// Head plus body limit, clamped to what fits in memory.
    pub fn max_response_bytes(&self) -> usize {
        let total = self
            .max_response_headers_bytes
            .saturating_add(self.max_response_body_bytes);
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Suffix of every partition name. Bump it on each deployment that
    /// changes cached content.
    pub version: String,
    /// Directory used to persist partitions (optional, in-memory otherwise).
    pub cache_dir: Option<String>,
    /// Fetched and stored all-or-nothing during install.
    pub critical_resources: Vec<String>,
    /// Warmed in the background after activation.
    pub lazy_resources: Vec<String>,
    pub install_attempts: u32,
    pub install_retry_delay_secs: u64,
    /// Tag large non-webp images with long-lived cache headers.
    pub image_hints: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "v2".into(),
            cache_dir: None,
            critical_resources: vec![
                "/".into(),
                "/css/pixel-hive.webflow.shared.6a98837a7.css".into(),
                "/js/jquery-3.5.1.min.dc5e7f18c8.js".into(),
                "/js/performance-optimizer.js".into(),
                "/js/font-optimizer.js".into(),
                "/js/asset-compressor.js".into(),
            ],
            lazy_resources: vec![
                "/css/growflix.webflow.6be85dae4.css".into(),
                "/css/kitpro-juke.webflow.shared.12889bc9f.min.css".into(),
            ],
            install_attempts: 3,
            install_retry_delay_secs: 5,
            image_hints: true,
        }
    }
}

impl CacheConfig {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cache_dir(&self) -> Option<&str> {
        self.cache_dir.as_deref()
    }

    pub fn critical_resources(&self) -> &[String] {
        &self.critical_resources
    }

    pub fn lazy_resources(&self) -> &[String] {
        &self.lazy_resources
    }

    pub fn install_attempts(&self) -> u32 {
        self.install_attempts
    }

    pub fn install_retry_delay_secs(&self) -> u64 {
        self.install_retry_delay_secs
    }

    pub fn image_hints(&self) -> bool {
        self.image_hints
    }

    pub fn static_partition(&self) -> String {
        self.partition_name("static")
    }

    pub fn dynamic_partition(&self) -> String {
        self.partition_name("dynamic")
    }

    fn partition_name(&self, kind: &str) -> String {
        format!("{kind}-{}", self.version)
    }
}

// =======================================================
// SWCACHE CONFIG (main config)
// =======================================================
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwcacheConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl SwcacheConfig {
    pub fn global(&self) -> &GlobalConfig {
        &self.global
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Toml).required(false))
            .build()?;

        let mut cfg: SwcacheConfig = built.try_deserialize()?;

        cfg.apply_defaults();
        Ok(cfg)
    }

    pub fn from_file_or_default(file_name: &str) -> Self {
        match Self::from_file(file_name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error reading config '{file_name}': {e}");
                eprintln!("Using default config (in-memory)...");
                SwcacheConfig::default()
            }
        }
    }

    fn apply_defaults(&mut self) {
        // GLOBAL
        let def_global = GlobalConfig::default();

        if self.global.log_level.is_empty() {
            self.global.log_level = def_global.log_level;
        }
        if self.global.max_connections == 0 {
            self.global.max_connections = def_global.max_connections;
        }

        // SERVER
        let def_server = ServerConfig::default();

        if self.server.listen.is_empty() {
            self.server.listen = def_server.listen;
        }
        if self.server.control_path.is_empty() {
            self.server.control_path = def_server.control_path;
        }

        // UPSTREAM
        let def_upstream = UpstreamConfig::default();

        if self.upstream.connect_timeout_secs == 0 {
            self.upstream.connect_timeout_secs = def_upstream.connect_timeout_secs;
        }
        if self.upstream.max_response_headers_bytes == 0 {
            self.upstream.max_response_headers_bytes = def_upstream.max_response_headers_bytes;
        }
        if self.upstream.max_response_body_bytes == 0 {
            self.upstream.max_response_body_bytes = def_upstream.max_response_body_bytes;
        }
        if self
            .upstream
            .host_header
            .as_deref()
            .is_some_and(|h| h.trim().is_empty())
        {
            self.upstream.host_header = None;
        }

        // CACHE
        let def_cache = CacheConfig::default();

        if self.cache.version.is_empty() {
            self.cache.version = def_cache.version;
        }
        if self.cache.install_attempts == 0 {
            self.cache.install_attempts = def_cache.install_attempts;
        }
        if self
            .cache
            .cache_dir
            .as_deref()
            .is_some_and(|d| d.trim().is_empty())
        {
            self.cache.cache_dir = None;
        }
    }

    pub fn print(&self) {
        println!("================ SWCACHE CONFIG ================");

        println!("\n[global]");
        println!("  log_level            = {}", self.global.log_level);
        println!("  max_connections      = {}", self.global.max_connections);

        println!("\n[server]");
        println!("  listen               = {}", self.server.listen);
        println!("  control_path         = {}", self.server.control_path);
        println!("  keepalive            = {}", self.server.keepalive);

        println!("\n[upstream]");
        println!("  origin               = {}", self.upstream.origin);
        println!("  host_header          = {}", self.upstream.host_header());
        println!(
            "  connect_timeout_secs = {}",
            self.upstream.connect_timeout_secs
        );
        println!(
            "  read_timeout_secs    = {}",
            self.upstream.read_timeout_secs
        );
        println!(
            "  max_response_headers_bytes = {}",
            self.upstream.max_response_headers_bytes
        );
        println!(
            "  max_response_body_bytes = {}",
            self.upstream.max_response_body_bytes
        );

        println!("\n[cache]");
        println!("  version              = {}", self.cache.version);
        println!("  cache_dir            = {:?}", self.cache.cache_dir);
        println!("  static partition     = {}", self.cache.static_partition());
        println!("  dynamic partition    = {}", self.cache.dynamic_partition());
        println!(
            "  critical_resources   = {:?}",
            self.cache.critical_resources
        );
        println!("  lazy_resources       = {:?}", self.cache.lazy_resources);
        println!("  install_attempts     = {}", self.cache.install_attempts);
        println!(
            "  install_retry_delay_secs = {}",
            self.cache.install_retry_delay_secs
        );
        println!("  image_hints          = {}", self.cache.image_hints);

        println!("================================================");
    }
}
