use std::fmt::Write as _;

use crate::core::config::data::{path_display, Settings};

impl Settings {
    /// Multi-line summary shown at startup and by `/config`.
    pub fn summary(&self, mode: &str, dev: bool, config_path: &std::path::Path) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "--- Subconscious Configuration ---");
        let _ = writeln!(out, "Mode: {mode}");
        let _ = writeln!(out, "Development: {dev}");
        let _ = writeln!(out, "Settings: {}", path_display(config_path));
        let _ = writeln!(out, "Data: {}", path_display(&self.data_dir));
        let _ = writeln!(
            out,
            "Model: {}",
            self.model_label().unwrap_or_else(|| "(unset)".to_string())
        );
        let _ = writeln!(out, "Workspace: {}", self.default_workspace);
        let _ = writeln!(out, "Installation: {}", self.installation_id);
        out.push_str("----------------------------------");
        out
    }
}
