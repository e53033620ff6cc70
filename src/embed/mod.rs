//! Embedded static resources.
//!
//! # Module Structure
//!
//! - `template` - Template types for typed variable injection
//! - `preview` - The payload script and the Hugo partial that loads it
//!
//! # Usage
//!
//! ```ignore
//! use embed::{PAYLOAD_JS, PayloadVars};
//!
//! let js = PAYLOAD_JS.render(&PayloadVars { embedder_origin: origin.to_string() });
//! ```

mod template;

pub use template::{Template, TemplateVars};

pub mod preview {
    use super::{Template, TemplateVars};

    /// Variables for payload.js.
    pub struct PayloadVars {
        /// Origin of the embedding frame, the only target messages are posted to.
        pub embedder_origin: String,
    }

    impl TemplateVars for PayloadVars {
        fn apply(&self, content: &str) -> String {
            content.replace(
                "__EMBEDDER_ORIGIN__",
                &serde_json::to_string(&self.embedder_origin).unwrap_or_else(|_| "\"\"".into()),
            )
        }
    }

    /// Script the partial injects into every page; handed to Hugo base64
    /// encoded through an environment variable.
    pub const PAYLOAD_JS: Template<PayloadVars> = Template::new(include_str!("preview/payload.js"));

    /// Variables for live-preview.html.
    pub struct PartialVars {
        /// Environment variable carrying the payload script.
        pub script_env: String,
    }

    impl TemplateVars for PartialVars {
        fn apply(&self, content: &str) -> String {
            content.replace("__SCRIPT_ENV__", &self.script_env)
        }
    }

    /// Hugo partial the site includes to load the payload and publish its
    /// page directory.
    pub const LIVE_PREVIEW_PARTIAL: Template<PartialVars> =
        Template::new(include_str!("preview/live-preview.html"));
}

pub use preview::{LIVE_PREVIEW_PARTIAL, PAYLOAD_JS, PartialVars, PayloadVars};
