//! `partial` command: print the live preview partial.

use std::io::Write;

use anyhow::Result;

use crate::config::PreviewConfig;
use crate::embed::{LIVE_PREVIEW_PARTIAL, PartialVars};

/// Where the partial goes in a site, for the hint on stderr.
const PARTIAL_PATH: &str = "layouts/partials/live-preview.html";

pub fn print_partial(config: &PreviewConfig) -> Result<()> {
    let partial = render_partial(config);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(partial.as_bytes())?;
    stdout.flush()?;

    crate::log!("partial"; "save as {} and include it in the <head> of every page", PARTIAL_PATH);
    Ok(())
}

fn render_partial(config: &PreviewConfig) -> String {
    LIVE_PREVIEW_PARTIAL.render(&PartialVars {
        script_env: config.hugo.script_env.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_partial_uses_configured_env() {
        let config = test_parse_config("[hugo]\nscript_env = \"HUGO_MY_PREVIEW\"");
        let partial = render_partial(&config);
        assert!(partial.contains(r#"getenv "HUGO_MY_PREVIEW""#));
    }
}
