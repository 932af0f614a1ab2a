use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Server options are provided via environment variables:
  CONFIG_PATH (default: ./config.yaml)
  DB_PATH     (default: data/app.db)
  PORT        (default: 5151 or config.listen_port)

On first start with an empty database an 'admin' account is created with
password 'admin123'; change it immediately.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "choreboard-server",
    version,
    about = "Choreboard server",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Optional subcommand. Without one, runs the server.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an account directly in the database (bootstrap helper)
    CreateUser {
        #[arg(long)]
        username: String,
        /// Display name; defaults to the username
        #[arg(long)]
        display_name: Option<String>,
        /// One of ADMIN, PARENT, CHILD
        #[arg(long, default_value = "PARENT")]
        role: String,
        #[arg(long)]
        password: String,
    },
}
