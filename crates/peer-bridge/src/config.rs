//! Bridge configuration.
//!
//! Configuration is read once when the bridge is built. The environment layer
//! mirrors the debug properties a host process usually exposes: which log
//! categories are on, the durable-handle ceiling, which type map backend to use
//! and whether the assignability check is strict.

use bitflags::bitflags;

use crate::error::{BridgeError, Result};

/// Durable-handle ceiling on a physical device.
pub const DEFAULT_MAX_DURABLE_COUNT: usize = 51_200;

/// Durable-handle ceiling on an emulator.
pub const EMULATOR_MAX_DURABLE_COUNT: usize = 2_000;

/// Environment variable holding the comma-separated log categories.
pub const ENV_LOG: &str = "PEER_BRIDGE_LOG";
/// Environment variable overriding the durable-handle ceiling.
pub const ENV_MAX_DURABLE: &str = "PEER_BRIDGE_MAX_DURABLE";
/// Environment variable selecting the type map backend.
pub const ENV_TYPEMAP: &str = "PEER_BRIDGE_TYPEMAP";
/// Environment variable toggling strict assignability.
pub const ENV_STRICT_ASSIGNABILITY: &str = "PEER_BRIDGE_STRICT_ASSIGNABILITY";

bitflags! {
    /// Diagnostic log categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LogCategories: u32 {
        const DEFAULT = 1 << 0;
        /// Type resolution and assignability diagnostics.
        const ASSEMBLY = 1 << 1;
        /// Collection requests and bridge cycles.
        const GC = 1 << 2;
        /// Durable and weak-durable reference traffic.
        const GREF = 1 << 3;
        /// Transient reference traffic.
        const LREF = 1 << 4;
    }
}

/// Which type map backend the bridge resolves names with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeMapKind {
    /// Precomputed name-to-type table.
    ExactTable,
    /// Runtime registrations plus package lookups.
    HierarchyWalking,
    /// Registrations collected from `register_peer_type!` sites.
    #[default]
    AttributeScan,
}

impl TypeMapKind {
    /// Parses the textual backend name used by [`ENV_TYPEMAP`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] for unknown names.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exact" | "exact-table" => Ok(Self::ExactTable),
            "hierarchy" | "hierarchy-walking" => Ok(Self::HierarchyWalking),
            "attribute" | "attribute-scan" => Ok(Self::AttributeScan),
            _ => Err(BridgeError::InvalidConfig {
                key: ENV_TYPEMAP,
                value: value.to_owned(),
            }),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Ceiling the foreign runtime enforces on live durable handles.
    /// `usize::MAX` means unbounded.
    pub max_durable_count: usize,
    /// Outstanding durable count at which a managed collection is requested.
    /// `usize::MAX` disables the request.
    pub durable_threshold: usize,
    /// When `true`, an assignability mismatch yields "no peer"; otherwise the
    /// mismatch is logged and activation proceeds.
    pub strict_assignability: bool,
    pub log_categories: LogCategories,
    /// Omit backtraces from durable reference logs.
    pub light_gref: bool,
    /// Omit backtraces from transient reference logs.
    pub light_lref: bool,
    pub type_map: TypeMapKind,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::with_max(Some(DEFAULT_MAX_DURABLE_COUNT))
    }
}

impl BridgeConfig {
    /// Configuration for a device-class foreign runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an emulated foreign runtime with a small handle table.
    #[must_use]
    pub fn emulator() -> Self {
        Self::with_max(Some(EMULATOR_MAX_DURABLE_COUNT))
    }

    fn with_max(max: Option<usize>) -> Self {
        let mut config = Self {
            max_durable_count: usize::MAX,
            durable_threshold: usize::MAX,
            strict_assignability: true,
            log_categories: LogCategories::empty(),
            light_gref: false,
            light_lref: false,
            type_map: TypeMapKind::default(),
        };
        config.set_max_durable_count(max);
        config
    }

    /// Sets the durable ceiling and derives the threshold as 90% of it.
    /// `None` makes both unbounded.
    pub fn set_max_durable_count(&mut self, max: Option<usize>) {
        match max {
            Some(max) => {
                self.max_durable_count = max;
                self.durable_threshold = threshold_for(max);
            }
            None => {
                self.max_durable_count = usize::MAX;
                self.durable_threshold = usize::MAX;
            }
        }
    }

    #[must_use]
    pub fn with_max_durable_count(mut self, max: Option<usize>) -> Self {
        self.set_max_durable_count(max);
        self
    }

    /// Overrides the threshold without touching the ceiling.
    #[must_use]
    pub const fn with_durable_threshold(mut self, threshold: usize) -> Self {
        self.durable_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_strict_assignability(mut self, strict: bool) -> Self {
        self.strict_assignability = strict;
        self
    }

    #[must_use]
    pub const fn with_log_categories(mut self, categories: LogCategories) -> Self {
        self.log_categories = categories;
        self
    }

    #[must_use]
    pub const fn with_type_map(mut self, kind: TypeMapKind) -> Self {
        self.type_map = kind;
        self
    }

    /// Returns `true` if any category in `category` is enabled.
    #[inline]
    #[must_use]
    pub const fn logs(&self, category: LogCategories) -> bool {
        self.log_categories.intersects(category)
    }

    /// Builds a configuration from the process environment.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup, starting from
    /// [`BridgeConfig::default`].
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(spec) = lookup(ENV_LOG) {
            let parsed = parse_log_spec(&spec);
            config.log_categories = parsed.categories;
            config.light_gref = parsed.light_gref;
            config.light_lref = parsed.light_lref;
        }

        if let Some(value) = lookup(ENV_MAX_DURABLE) {
            match parse_max_durable(&value) {
                Ok(max) => config.set_max_durable_count(max),
                Err(err) => tracing::warn!(%err, "ignoring durable ceiling override"),
            }
        }

        if let Some(value) = lookup(ENV_TYPEMAP) {
            match TypeMapKind::parse(&value) {
                Ok(kind) => config.type_map = kind,
                Err(err) => tracing::warn!(%err, "ignoring type map override"),
            }
        }

        if let Some(value) = lookup(ENV_STRICT_ASSIGNABILITY) {
            match parse_bool(&value) {
                Some(strict) => config.strict_assignability = strict,
                None => tracing::warn!(
                    value = value.as_str(),
                    "ignoring strict assignability override"
                ),
            }
        }

        config
    }
}

const fn threshold_for(max: usize) -> usize {
    max / 10 * 9 + (max % 10) * 9 / 10
}

/// Result of parsing a log category list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogSpec {
    pub categories: LogCategories,
    pub light_gref: bool,
    pub light_lref: bool,
}

/// Parses a comma-separated category list such as `gref-,gc`.
///
/// A trailing `-` on `gref` or `lref` enables the category without
/// backtraces. `all` enables every category. Unknown names are ignored.
#[must_use]
pub fn parse_log_spec(spec: &str) -> LogSpec {
    let mut out = LogSpec::default();
    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "all" => out.categories = LogCategories::all(),
            "default" => out.categories |= LogCategories::DEFAULT,
            "assembly" => out.categories |= LogCategories::ASSEMBLY,
            "gc" => out.categories |= LogCategories::GC,
            "gref" => out.categories |= LogCategories::GREF,
            "gref-" => {
                out.categories |= LogCategories::GREF;
                out.light_gref = true;
            }
            "lref" => out.categories |= LogCategories::LREF,
            "lref-" => {
                out.categories |= LogCategories::LREF;
                out.light_lref = true;
            }
            other => tracing::debug!(category = other, "unknown log category"),
        }
    }
    out
}

/// Parses a durable ceiling override.
///
/// Accepts a decimal count with an optional `k` or `m` suffix. A negative
/// value means unbounded and yields `None`.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidConfig`] if the value is not a number or
/// overflows.
pub fn parse_max_durable(value: &str) -> Result<Option<usize>> {
    let invalid = || BridgeError::InvalidConfig {
        key: ENV_MAX_DURABLE,
        value: value.to_owned(),
    };
    let trimmed = value.trim();
    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((idx, 'k' | 'K')) => (&trimmed[..idx], 1_000_i64),
        Some((idx, 'm' | 'M')) => (&trimmed[..idx], 1_000_000_i64),
        Some(_) => (trimmed, 1),
        None => return Err(invalid()),
    };
    let count: i64 = digits.trim().parse().map_err(|_| invalid())?;
    if count < 0 {
        return Ok(None);
    }
    let scaled = count.checked_mul(multiplier).ok_or_else(invalid)?;
    usize::try_from(scaled).map(Some).map_err(|_| invalid())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
