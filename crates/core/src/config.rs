//! Resource estimation configuration
//!
//! Loaded from TOML. Every key is optional; missing keys take the defaults
//! below, which reproduce the established estimation and reporting policy.
//!
//! ```toml
//! [estimation]
//! search_radius = 50.0
//! min_samples = 3
//! max_samples = 12
//! batch_size = 500
//!
//! [classification.measured]
//! max_distance = 25.0
//! min_samples = 4
//!
//! [reporting]
//! metal_factor = 0.029166667
//! density = 2.7
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metal-content factor applied by the resource aggregator
/// (tonnes × grade × factor = troy ounces).
///
/// The production summary uses [`PRODUCTION_METAL_FACTOR`] for the same
/// conversion. The two values disagree; this one is kept for compatibility
/// with existing resource reports pending review by a qualified person.
pub const RESOURCE_METAL_FACTOR: f64 = 0.029_166_667;

/// Troy ounces per gram, as used by the production-tracking summary.
pub const PRODUCTION_METAL_FACTOR: f64 = 0.032_150_746_6;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub estimation: EstimationConfig,
    pub classification: ClassificationConfig,
    pub reporting: ReportingConfig,
}

/// Sample search parameters for block estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationConfig {
    /// Maximum centroid-to-sample distance considered
    pub search_radius: f64,
    /// Blocks with fewer samples in range stay unestimated
    pub min_samples: usize,
    /// Nearest samples used per block
    pub max_samples: usize,
    /// Blocks estimated and written per batch
    pub batch_size: usize,
}

impl Default for EstimationConfig {
    fn default() -> Self {
        Self {
            search_radius: 50.0,
            min_samples: 3,
            max_samples: 12,
            batch_size: 500,
        }
    }
}

/// Proximity and density requirement for one confidence category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Search distance must be <= this value
    pub max_distance: f64,
    /// Sample count must be >= this value
    pub min_samples: usize,
}

impl CategoryRule {
    pub const fn new(max_distance: f64, min_samples: usize) -> Self {
        Self { max_distance, min_samples }
    }

    #[inline]
    pub fn accepts(&self, search_distance: f64, sample_count: usize) -> bool {
        search_distance <= self.max_distance && sample_count >= self.min_samples
    }
}

/// Classification thresholds, checked in order measured, indicated, inferred.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    pub measured: CategoryRule,
    pub indicated: CategoryRule,
    pub inferred: CategoryRule,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            measured: CategoryRule::new(25.0, 4),
            indicated: CategoryRule::new(50.0, 2),
            inferred: CategoryRule::new(100.0, 1),
        }
    }
}

/// Reporting conversions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    /// Factor converting tonnes × grade into metal content
    pub metal_factor: f64,
    /// Bulk density (t/m³). No default: it must come from the deposit.
    pub density: Option<f64>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            metal_factor: RESOURCE_METAL_FACTOR,
            density: None,
        }
    }
}

impl ResourceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: ResourceConfig = toml::from_str(&content).map_err(|e| Error::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: ResourceConfig = toml::from_str(toml_str).map_err(|e| Error::Config {
            path: "<string>".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<()> {
        self.estimation.validate()?;

        for (name, rule) in [
            ("classification.measured.max_distance", self.classification.measured),
            ("classification.indicated.max_distance", self.classification.indicated),
            ("classification.inferred.max_distance", self.classification.inferred),
        ] {
            if !(rule.max_distance.is_finite() && rule.max_distance > 0.0) {
                return Err(invalid(name, rule.max_distance, "must be positive"));
            }
        }

        let r = &self.reporting;
        if !(r.metal_factor.is_finite() && r.metal_factor > 0.0) {
            return Err(invalid("reporting.metal_factor", r.metal_factor, "must be positive"));
        }
        if let Some(density) = r.density
            && !(density.is_finite() && density > 0.0)
        {
            return Err(invalid("reporting.density", density, "must be positive"));
        }
        Ok(())
    }
}

impl EstimationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.search_radius.is_finite() && self.search_radius > 0.0) {
            return Err(invalid("search_radius", self.search_radius, "must be positive"));
        }
        if self.min_samples < 1 {
            return Err(invalid("min_samples", self.min_samples, "must be at least 1"));
        }
        if self.max_samples < self.min_samples {
            return Err(invalid("max_samples", self.max_samples, "must be >= min_samples"));
        }
        if self.batch_size < 1 {
            return Err(invalid("batch_size", self.batch_size, "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(name: &'static str, value: impl ToString, reason: &str) -> Error {
    Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let c = ResourceConfig::default();
        assert_eq!(c.estimation.search_radius, 50.0);
        assert_eq!(c.estimation.min_samples, 3);
        assert_eq!(c.estimation.max_samples, 12);
        assert_eq!(c.classification.measured, CategoryRule::new(25.0, 4));
        assert_eq!(c.classification.indicated, CategoryRule::new(50.0, 2));
        assert_eq!(c.classification.inferred, CategoryRule::new(100.0, 1));
        assert_eq!(c.reporting.metal_factor, RESOURCE_METAL_FACTOR);
        assert!(c.reporting.density.is_none());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = ResourceConfig::from_toml(
            r#"
            [estimation]
            search_radius = 80.0

            [classification.indicated]
            max_distance = 60.0
            min_samples = 3

            [reporting]
            density = 2.7
            "#,
        )
        .unwrap();
        assert_eq!(c.estimation.search_radius, 80.0);
        assert_eq!(c.estimation.max_samples, 12);
        assert_eq!(c.classification.indicated, CategoryRule::new(60.0, 3));
        assert_eq!(c.classification.measured, CategoryRule::new(25.0, 4));
        assert_eq!(c.reporting.density, Some(2.7));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ResourceConfig::from_toml("[estimation]\nsearch_radius = 0.0").is_err());
        assert!(ResourceConfig::from_toml("[estimation]\nmin_samples = 5\nmax_samples = 4").is_err());
        assert!(ResourceConfig::from_toml("[reporting]\ndensity = -1.0").is_err());
        assert!(ResourceConfig::from_toml("[estimation\n").is_err());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reporting]\nmetal_factor = 0.0321507466").unwrap();
        let c = ResourceConfig::load(file.path()).unwrap();
        assert_eq!(c.reporting.metal_factor, PRODUCTION_METAL_FACTOR);

        let missing = ResourceConfig::load(Path::new("/nonexistent/geoblock.toml"));
        assert!(matches!(missing, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rule_accepts() {
        let rule = CategoryRule::new(25.0, 4);
        assert!(rule.accepts(25.0, 4));
        assert!(!rule.accepts(25.1, 4));
        assert!(!rule.accepts(10.0, 3));
    }
}
