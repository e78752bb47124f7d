//! Serve command implementation.

use std::path::PathBuf;

use clap::Args;
use livesrv_config::{CliSettings, Config};
use livesrv_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a directory.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Directory to serve (overrides config, default: current directory).
    pub dir: Option<PathBuf>,

    /// Port to listen on (overrides config, default: 3000).
    pub port: Option<u16>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    pub host: Option<String>,

    /// Path to configuration file (default: auto-discover livesrv.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Reload browsers when files under the served directory change.
    #[arg(short, long)]
    pub watch: bool,

    /// Do not inject the reload script into HTML pages.
    #[arg(long)]
    pub no_inject: bool,
}

impl ServeArgs {
    /// Load configuration, print the banner and run the server.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = self.cli_settings();
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let base = format!(
            "http://{}:{}",
            display_host(&config.server.host),
            config.server.port
        );
        output.info(&format!("Serving {}", config.root.display()));
        output.url("Listening on", &base);
        output.url("Trigger reload:", &format!("{base}/sse/reload"));
        if config.live_reload.watch {
            output.info("File watching: enabled");
        }
        if !config.live_reload.inject {
            output.info("Script injection: disabled");
        }

        run_server(server_config_from_config(&config)).await?;

        output.success("Server stopped");
        Ok(())
    }

    /// Overrides taken from the command line. Unset flags leave the config
    /// value alone.
    fn cli_settings(&self) -> CliSettings {
        CliSettings {
            host: self.host.clone(),
            port: self.port,
            root: self.dir.clone(),
            inject: self.no_inject.then_some(false),
            watch: self.watch.then_some(true),
        }
    }
}

/// Host to show in URLs; wildcard addresses are shown as `localhost`.
fn display_host(host: &str) -> &str {
    match host {
        "0.0.0.0" | "::" | "[::]" => "localhost",
        _ => host,
    }
}
