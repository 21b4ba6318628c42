//! Syntactic checks on Azure resource identifiers.
//!
//! Every tool runs these before issuing any provider call.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{Result, StorageMcpError};

static SUBSCRIPTION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("subscription id pattern is valid")
});

static RESOURCE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").expect("resource group pattern is valid"));

static STORAGE_ACCOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("storage account pattern is valid"));

const RESOURCE_GROUP_MAX_LEN: usize = 90;
const STORAGE_ACCOUNT_MIN_LEN: usize = 3;
const STORAGE_ACCOUNT_MAX_LEN: usize = 24;

/// Validate an Azure subscription ID (canonical UUID form, any case).
///
/// The input is returned as given; case is not normalized.
pub fn validate_subscription_id(subscription_id: &str) -> Result<&str> {
    if subscription_id.is_empty() {
        return Err(StorageMcpError::validation(
            "Subscription ID cannot be empty",
            "subscription_id",
        ));
    }

    if !SUBSCRIPTION_ID.is_match(&subscription_id.to_ascii_lowercase()) {
        return Err(StorageMcpError::validation(
            "Invalid subscription ID format. Must be a valid UUID",
            "subscription_id",
        ));
    }

    Ok(subscription_id)
}

/// Validate an Azure resource group name: 1-90 characters of letters,
/// digits, periods, underscores and hyphens.
pub fn validate_resource_group(resource_group: &str) -> Result<&str> {
    if resource_group.is_empty() {
        return Err(StorageMcpError::validation(
            "Resource group name cannot be empty",
            "resource_group",
        ));
    }

    if !RESOURCE_GROUP.is_match(resource_group) {
        return Err(StorageMcpError::validation(
            "Invalid resource group name. Must contain only alphanumeric characters, \
             periods, underscores, and hyphens",
            "resource_group",
        ));
    }

    // The charset check guarantees ASCII, so byte length equals char count.
    if resource_group.len() > RESOURCE_GROUP_MAX_LEN {
        return Err(StorageMcpError::validation(
            "Resource group name cannot exceed 90 characters",
            "resource_group",
        ));
    }

    Ok(resource_group)
}

/// Validate a storage account name: 3-24 lowercase letters and digits.
pub fn validate_storage_account_name(account_name: &str) -> Result<&str> {
    if account_name.is_empty() {
        return Err(StorageMcpError::validation(
            "Storage account name cannot be empty",
            "account_name",
        ));
    }

    if !STORAGE_ACCOUNT.is_match(account_name) {
        return Err(StorageMcpError::validation(
            "Invalid storage account name. Must contain only lowercase letters and numbers",
            "account_name",
        ));
    }

    if !(STORAGE_ACCOUNT_MIN_LEN..=STORAGE_ACCOUNT_MAX_LEN).contains(&account_name.len()) {
        return Err(StorageMcpError::validation(
            "Storage account name must be between 3 and 24 characters",
            "account_name",
        ));
    }

    Ok(account_name)
}
