// Command-line interface definitions for taptype

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "taptype")]
#[command(author, version, about = "Hotkey-driven speech-to-text for Linux desktops")]
#[command(long_about = "
Taptype turns speech into typed text. Hold a hotkey to record, release
to transcribe; the text lands at your cursor (or on the clipboard).

SETUP:
  1. Add yourself to the input group: sudo usermod -aG input $USER
  2. Log out and back in
  3. Install wtype (Wayland) or ydotool for typing support
  4. Place a whisper ggml model under the models directory
  5. Run: taptype start

USAGE:
  Hold ScrollLock (default) while speaking, release to transcribe.
  Text is typed at the cursor position, with clipboard fallback.
")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Override hotkey (e.g., SCROLLLOCK, PAUSE, F13)
    #[arg(long, value_name = "KEY")]
    pub hotkey: Option<String>,

    /// Override whisper model (tiny, base.en, small, medium, large-v3)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Use toggle mode (press to start/stop) instead of push-to-talk
    #[arg(long)]
    pub toggle: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the daemon
    Start {
        /// Detach and run in the background
        #[arg(long)]
        background: bool,
    },

    /// Stop a running daemon
    Stop,

    /// Show daemon and dependency status
    Status,

    /// Run the daemon in the foreground (what `start --background` spawns)
    Run,
}
