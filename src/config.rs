use std::path::Path;

use configparser::ini::Ini;
use smart_default::SmartDefault;
use thiserror_no_std::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Cannot read config: {0}")]
    Read(String),

    #[error("Invalid value for \"{0}\": {1}")]
    InvalidValue(String, String),
}

impl std::error::Error for ConfigError {}

type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// What a reference to a variable that was never defined turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, SmartDefault)]
pub enum UndefinedPolicy {
    /// Dropped, like cmd.exe does inside batch files.
    #[default]
    Empty,
    /// Left as written.
    Keep,
}

impl TryFrom<&str> for UndefinedPolicy {
    type Error = ConfigError;

    fn try_from(value: &str) -> ConfigResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(UndefinedPolicy::Empty),
            "keep" => Ok(UndefinedPolicy::Keep),
            _ => Err(ConfigError::InvalidValue(
                "undefined".to_string(),
                value.to_string(),
            )),
        }
    }
}

/// Settings shared by both dialects and the sample collector.
///
/// # Examples
///
/// ```rust
/// use lnk_deobf::{BatchSession, Config};
///
/// let config = Config::default().with_keep_assignments(true);
/// let result = BatchSession::new().with_config(config).deobfuscate("set A=1 & echo %A%");
/// assert_eq!(result.output(), "set A=1 & echo 1");
/// ```
#[derive(Debug, Clone, PartialEq, SmartDefault)]
pub struct Config {
    /// Expand `!NAME!` from the first statement on. Otherwise `!NAME!` is
    /// only expanded after a `/v:on` switch.
    pub delayed_expansion: bool,
    /// Keep `set` statements in batch output.
    pub keep_assignments: bool,
    /// Skip line wrapping of long `&&` chains.
    pub raw: bool,
    #[default = 120]
    pub wrap_width: usize,
    pub undefined: UndefinedPolicy,
    /// Seed the table with typical Windows environment values / INF dirids.
    pub well_known: bool,
    /// INF definitions come from `[Strings]` sections only.
    #[default = true]
    pub inf_strings_only: bool,
    #[default = "lnkparse"]
    pub lnk_parser: String,
    #[default(vec!["-j".to_string()])]
    pub lnk_parser_args: Vec<String>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let mut ini = Ini::new();
        ini.load(path.as_ref()).map_err(ConfigError::Read)?;
        Self::from_ini(&ini)
    }

    pub fn from_ini_str(content: &str) -> ConfigResult<Self> {
        let mut ini = Ini::new();
        ini.read(content.to_string()).map_err(ConfigError::Read)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> ConfigResult<Self> {
        let mut config = Self::default();
        let bool_value = |key: &str| {
            ini.getboolcoerce("deobfuscate", key)
                .map_err(|err| ConfigError::InvalidValue(key.to_string(), err))
        };

        if let Some(value) = bool_value("delayed_expansion")? {
            config.delayed_expansion = value;
        }
        if let Some(value) = bool_value("keep_assignments")? {
            config.keep_assignments = value;
        }
        if let Some(value) = bool_value("raw")? {
            config.raw = value;
        }
        if let Some(value) = bool_value("well_known")? {
            config.well_known = value;
        }
        if let Some(value) = bool_value("inf_strings_only")? {
            config.inf_strings_only = value;
        }
        if let Some(value) = ini
            .getuint("deobfuscate", "wrap_width")
            .map_err(|err| ConfigError::InvalidValue("wrap_width".to_string(), err))?
        {
            config.wrap_width = value as usize;
        }
        if let Some(value) = ini.get("deobfuscate", "undefined") {
            config.undefined = UndefinedPolicy::try_from(value.as_str())?;
        }

        if let Some(value) = ini.get("collect", "lnk_parser") {
            config.lnk_parser = value;
        }
        if let Some(value) = ini.get("collect", "lnk_parser_args") {
            config.lnk_parser_args = value.split_whitespace().map(str::to_string).collect();
        }

        log::debug!("Config loaded: {:?}", config);
        Ok(config)
    }

    pub fn with_delayed_expansion(mut self, enabled: bool) -> Self {
        self.delayed_expansion = enabled;
        self
    }

    pub fn with_keep_assignments(mut self, enabled: bool) -> Self {
        self.keep_assignments = enabled;
        self
    }

    pub fn with_raw(mut self, enabled: bool) -> Self {
        self.raw = enabled;
        self
    }

    pub fn with_wrap_width(mut self, width: usize) -> Self {
        self.wrap_width = width;
        self
    }

    pub fn with_undefined(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined = policy;
        self
    }

    pub fn with_well_known(mut self, enabled: bool) -> Self {
        self.well_known = enabled;
        self
    }

    pub fn with_inf_strings_only(mut self, enabled: bool) -> Self {
        self.inf_strings_only = enabled;
        self
    }

    pub fn with_lnk_parser(mut self, program: &str, args: &[&str]) -> Self {
        self.lnk_parser = program.to_string();
        self.lnk_parser_args = args.iter().map(|arg| arg.to_string()).collect();
        self
    }
}
