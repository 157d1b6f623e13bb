use anyhow::{anyhow, Result};
use std::path::Path;

use crate::models::YearSelector;

/// Validation utilities for user-supplied settings and arguments
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate a catalog API key
    pub fn validate_api_key(key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(anyhow!("API key cannot be empty"));
        }

        if key.len() > 256 {
            return Err(anyhow!("API key too long (max 256 characters)"));
        }

        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(anyhow!("API key contains whitespace or control characters"));
        }

        Ok(())
    }

    /// Validate a two-letter region code such as `US`
    pub fn validate_region_code(code: &str) -> Result<()> {
        if code.len() != 2 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(anyhow!(
                "Region code must be two uppercase ASCII letters, got {:?}",
                code
            ));
        }
        Ok(())
    }

    /// Validate a batch size
    pub fn validate_batch_size(batch_size: usize) -> Result<()> {
        if batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than 0"));
        }
        Ok(())
    }

    /// Validate a calendar year
    pub fn validate_year(year: i32) -> Result<()> {
        if !(1970..=9999).contains(&year) {
            return Err(anyhow!("Year {} is outside 1970..=9999", year));
        }
        Ok(())
    }

    /// Parse and validate a year argument (`2024` or `all`)
    pub fn parse_year_selector(raw: &str) -> Result<YearSelector> {
        let selector: YearSelector = raw.parse().map_err(|e| anyhow!("{}", e))?;
        if let YearSelector::Year(year) = selector {
            Self::validate_year(year)?;
        }
        Ok(selector)
    }

    /// Validate a data directory path
    pub fn validate_data_dir(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.is_empty() {
            return Err(anyhow!("Data directory cannot be empty"));
        }

        if path_str.contains('\0') {
            return Err(anyhow!("Data directory contains invalid characters"));
        }

        // Check path length
        if path_str.len() > 4096 {
            return Err(anyhow!("Data directory path too long (max 4096 characters)"));
        }

        if path.exists() && !path.is_dir() {
            return Err(anyhow!("{} exists and is not a directory", path.display()));
        }

        Ok(())
    }
}
