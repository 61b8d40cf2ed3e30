//! Application configuration and CLI argument parsing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Placeholder replaced by the chunk text in synthesis arguments.
pub const TEXT_PLACEHOLDER: &str = "{text}";

/// Placeholder replaced by the artifact path in synthesis arguments.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Read-aloud command line.
#[derive(Parser, Debug, Clone)]
#[command(name = "read-aloud")]
#[command(author, version, about = "Read documents aloud with word-level highlighting", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the synthesis server (websocket delivery channel and document endpoints)
    Serve(ServeConfig),
    /// Read a transcript aloud through a running server
    Read(ReadConfig),
}

impl Cli {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }
}

/// External synthesis process invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisCommand {
    pub program: String,   // Executable, resolved through PATH
    pub args: Vec<String>, // Argument template with {text} / {output}
}

impl SynthesisCommand {
    /// Expand the argument template for one chunk.
    pub fn render_args(&self, text: &str, output: &str) -> Vec<String> {
        self.args.iter().map(|arg| arg.replace(TEXT_PLACEHOLDER, text).replace(OUTPUT_PLACEHOLDER, output)).collect()
    }
}

/// Server configuration.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct ServeConfig {
    /// Address to listen on
    #[arg(long, env = "READ_ALOUD_BIND", default_value = "0.0.0.0:5000")]
    pub bind: SocketAddr,

    /// Speech synthesis executable
    #[arg(long, env = "READ_ALOUD_TTS_PROGRAM", default_value = "gtts-cli")]
    pub tts_program: String,

    /// Synthesis argument template (repeatable). `{text}` is the chunk text, `{output}` the artifact path
    #[arg(long = "tts-arg", allow_hyphen_values = true, default_values_t = default_tts_args())]
    pub tts_args: Vec<String>,

    /// Media inspection executable used to measure artifact durations
    #[arg(long, env = "READ_ALOUD_PROBE_PROGRAM", default_value = "ffprobe")]
    pub probe_program: String,

    /// Words per synthesis chunk
    #[arg(long, default_value = "50")]
    pub chunk_words: usize,

    /// Concurrent synthesis workers per batch
    #[arg(long, default_value = "5")]
    pub concurrency: usize,

    /// Words per chunk on the progressive chapter text stream
    #[arg(long, default_value = "100")]
    pub stream_chunk_words: usize,

    /// Root directory for per-session scratch directories
    #[arg(long, env = "READ_ALOUD_TEMP_DIR", default_value_os_t = default_temp_dir())]
    pub temp_dir: PathBuf,

    /// Directory holding uploaded documents
    #[arg(long, env = "READ_ALOUD_UPLOAD_DIR", default_value_os_t = default_upload_dir())]
    pub upload_dir: PathBuf,

    /// CORS origin allowed to call the HTTP endpoints
    #[arg(long, default_value = "http://localhost:5173")]
    pub allowed_origin: String,
}

impl ServeConfig {
    pub fn synthesis_command(&self) -> SynthesisCommand {
        SynthesisCommand { program: self.tts_program.clone(), args: self.tts_args.clone() }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_words == 0 || self.stream_chunk_words == 0 {
            anyhow::bail!("Chunk sizes must be at least 1 word");
        }

        if self.concurrency == 0 {
            anyhow::bail!("Concurrency must be at least 1");
        }

        if self.tts_program.trim().is_empty() || self.probe_program.trim().is_empty() {
            anyhow::bail!("Synthesis and probe programs must not be empty");
        }

        if !self.tts_args.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            anyhow::bail!("Synthesis arguments must contain the {} placeholder", OUTPUT_PLACEHOLDER);
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Bind address: {}", self.bind);
        info!("  Synthesis: {} {}", self.tts_program, self.tts_args.join(" "));
        info!("  Duration probe: {}", self.probe_program);
        info!("  Chunk size: {} words ({} on text stream)", self.chunk_words, self.stream_chunk_words);
        info!("  Concurrency: {}", self.concurrency);
        info!("  Temp directory: {}", self.temp_dir.display());
        info!("  Upload directory: {}", self.upload_dir.display());
        info!("  Allowed origin: {}", self.allowed_origin);
    }
}

/// Client configuration.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
pub struct ReadConfig {
    /// Server websocket URL
    #[arg(long, short = 's', env = "READ_ALOUD_SERVER", default_value = "ws://localhost:5000/ws")]
    pub server: String,

    /// Plain text transcript to read ("-" for stdin)
    #[arg(long, short = 'f')]
    pub file: PathBuf,

    /// Words per synthesis chunk (must match the server)
    #[arg(long, default_value = "50")]
    pub chunk_words: usize,

    /// Pause between consecutive chunks in milliseconds
    #[arg(long, default_value = "100")]
    pub transition_delay_ms: u64,

    /// Playback position polling interval in milliseconds
    #[arg(long, default_value = "50")]
    pub position_interval_ms: u64,
}

impl ReadConfig {
    pub fn transition_delay(&self) -> Duration {
        Duration::from_millis(self.transition_delay_ms)
    }

    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_words == 0 {
            anyhow::bail!("Chunk size must be at least 1 word");
        }

        if self.transition_delay_ms >= 5000 {
            anyhow::bail!("Transition delay must be below 5000ms");
        }

        if self.position_interval_ms == 0 {
            anyhow::bail!("Position interval must be positive");
        }

        if !(self.server.starts_with("ws://") || self.server.starts_with("wss://")) {
            anyhow::bail!("Server URL must use ws:// or wss://: {}", self.server);
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Server: {}", self.server);
        info!("  Transcript: {}", self.file.display());
        info!("  Chunk size: {} words", self.chunk_words);
        info!("  Transition delay: {}ms", self.transition_delay_ms);
    }
}

fn default_tts_args() -> Vec<String> {
    vec![TEXT_PLACEHOLDER.to_string(), "--output".to_string(), OUTPUT_PLACEHOLDER.to_string()]
}

/// Get the default session scratch root (<tmp>/read-aloud).
fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("read-aloud")
}

/// Get the default upload directory (~/.read-aloud/uploads).
fn default_upload_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".read-aloud").join("uploads")
    } else {
        PathBuf::from("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["read-aloud", "serve"]).unwrap();
        let Command::Serve(config) = cli.command else { panic!("expected serve") };
        assert_eq!(config.chunk_words, 50);
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.stream_chunk_words, 100);
        assert_eq!(config.tts_args, vec!["{text}", "--output", "{output}"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_render_args() {
        let command = SynthesisCommand { program: "gtts-cli".into(), args: default_tts_args() };
        assert_eq!(command.render_args("hello world", "/tmp/c.mp3"), vec!["hello world", "--output", "/tmp/c.mp3"]);
    }

    #[test]
    fn test_serve_rejects_missing_output_placeholder() {
        let cli = Cli::try_parse_from(["read-aloud", "serve", "--tts-arg", "{text}"]).unwrap();
        let Command::Serve(config) = cli.command else { panic!("expected serve") };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_validation() {
        let cli = Cli::try_parse_from(["read-aloud", "read", "-f", "book.txt", "--transition-delay-ms", "6000"]).unwrap();
        let Command::Read(config) = cli.command else { panic!("expected read") };
        assert!(config.validate().is_err());
    }
}
