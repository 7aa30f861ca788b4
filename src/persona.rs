//! Static persona context loaded once at startup.

use crate::config::PersonaConfig;

/// Preamble followed by every configured persona file found in `dir`.
pub fn load_persona(config: &PersonaConfig) -> String {
    let mut context = config.preamble.clone();
    for file in &config.files {
        let path = config.dir.join(file);
        if !path.is_file() {
            continue;
        }
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                context.push_str(&format!("\nINFORMAZIONI DA {}:\n{}\n", file, content));
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable persona file");
            }
        }
    }
    context
}
