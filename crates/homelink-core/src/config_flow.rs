//! User config flow
//!
//! The first (and only) step of adding an integration interactively:
//! validate the submitted data against the live device or API, then either
//! create and persist a config entry or send the form back with a base error
//! code (`cannot_connect`, `invalid_auth`, `unknown`).

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::ConfigEntry;
use crate::traits::{ConfigEntryStore, Integration};

/// Form field errors are reported under this key when they are not field specific
pub const BASE_ERROR_KEY: &str = "base";

/// Outcome of a flow step
#[derive(Debug, Clone, PartialEq)]
pub enum FlowResult {
    /// The input was accepted and the entry persisted
    CreateEntry {
        /// The new entry
        entry: ConfigEntry,
    },
    /// Show the form again with errors
    ShowForm {
        /// Field name (or `"base"`) to error code
        errors: BTreeMap<String, String>,
    },
}

impl FlowResult {
    fn form_error(code: &str) -> Self {
        FlowResult::ShowForm {
            errors: BTreeMap::from([(BASE_ERROR_KEY.to_string(), code.to_string())]),
        }
    }
}

/// Handle the user step
///
/// # Parameters
///
/// - `integration`: Integration being configured
/// - `store`: Where the new entry is persisted
/// - `entry_id`: Id for the new entry
/// - `data`: Submitted form data
///
/// # Returns
///
/// [`FlowResult::CreateEntry`] on success, [`FlowResult::ShowForm`] otherwise.
/// Never fails.
pub async fn user_step(
    integration: &dyn Integration,
    store: &dyn ConfigEntryStore,
    entry_id: &str,
    data: Value,
) -> FlowResult {
    let domain = integration.domain();

    let title = match integration.validate_input(&data).await {
        Ok(title) => title,
        Err(e) => {
            let code = e.flow_error_code();
            warn!("{} config flow rejected input ({}): {}", domain, code, e);
            return FlowResult::form_error(code);
        }
    };

    let entry = ConfigEntry::new(entry_id, domain, title, data);
    if let Err(e) = store.add_entry(&entry).await {
        warn!("{} config flow could not store entry {}: {}", domain, entry_id, e);
        return FlowResult::form_error("unknown");
    }

    info!("{} config flow created entry {} ({})", domain, entry.entry_id, entry.title);
    FlowResult::CreateEntry { entry }
}
