//! Centralized configuration for the Undertow gateway.
//!
//! All tunable parameters are defined here so timing heuristics and
//! encoder settings can change without touching control flow.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all gateway components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub readiness: ReadinessConfig,
    pub streaming: StreamingConfig,
    pub transcode: TranscodeConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Timing heuristics for gating streams on torrent metadata.
#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    /// Delay after metadata arrives so at least one peer connection is attempted
    pub peer_grace: Duration,
    /// Absolute ceiling before streaming proceeds with whatever is known
    pub ceiling: Duration,
    /// Longest a stream waits for its first byte before answering 504; matches
    /// the point where clients give up on playback starting
    pub playback_start_ceiling: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            peer_grace: Duration::from_millis(500),
            ceiling: Duration::from_secs(15),
            playback_start_ceiling: Duration::from_secs(30),
        }
    }
}

/// Byte streaming configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Bytes requested from the engine per read
    pub chunk_size: usize,
    /// Delay before retrying a read whose bytes are not downloaded yet
    pub read_retry_delay: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256 * 1024, // 256 KiB
            read_retry_delay: Duration::from_millis(100),
        }
    }
}

/// External encoder configuration.
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Encoder binary, resolved through PATH when relative
    pub program: PathBuf,
    /// Arguments; the encoder must read stdin and write fragmented MP4 to stdout
    pub args: Vec<String>,
    /// Bytes read from encoder stdout per body chunk
    pub output_chunk_size: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            args: default_encoder_args(),
            output_chunk_size: 64 * 1024, // 64 KiB
        }
    }
}

/// FFmpeg arguments for browser-friendly fragmented MP4 over pipes.
///
/// `empty_moov` and `frag_keyframe` produce self-contained fragments with no
/// trailing seek index, so playback can start before encoding finishes.
pub fn default_encoder_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-i",
        "pipe:0",
        "-c:v",
        "libx264",
        "-preset",
        "ultrafast",
        "-tune",
        "zerolatency",
        "-pix_fmt",
        "yuv420p",
        "-c:a",
        "aac",
        "-b:a",
        "192k",
        "-movflags",
        "frag_keyframe+empty_moov+default_base_moof",
        "-f",
        "mp4",
        "pipe:1",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

impl GatewayConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("UNDERTOW_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("UNDERTOW_PORT")
            && let Ok(port) = port.parse::<u16>()
        {
            config.server.port = port;
        }

        if let Ok(grace) = std::env::var("UNDERTOW_PEER_GRACE_MS")
            && let Ok(millis) = grace.parse::<u64>()
        {
            config.readiness.peer_grace = Duration::from_millis(millis);
        }

        if let Ok(ceiling) = std::env::var("UNDERTOW_READY_TIMEOUT_SECS")
            && let Ok(seconds) = ceiling.parse::<u64>()
        {
            config.readiness.ceiling = Duration::from_secs(seconds);
        }

        if let Ok(chunk_size) = std::env::var("UNDERTOW_CHUNK_SIZE")
            && let Ok(bytes) = chunk_size.parse::<usize>()
            && bytes > 0
        {
            config.streaming.chunk_size = bytes;
        }

        if let Ok(encoder) = std::env::var("UNDERTOW_ENCODER")
            && !encoder.is_empty()
        {
            config.transcode.program = PathBuf::from(encoder);
        }

        config
    }

    /// Creates a configuration with short timings for tests.
    pub fn for_testing() -> Self {
        Self {
            readiness: ReadinessConfig {
                peer_grace: Duration::from_millis(20),
                ceiling: Duration::from_millis(300),
                playback_start_ceiling: Duration::from_secs(1),
            },
            streaming: StreamingConfig {
                chunk_size: 4096,
                read_retry_delay: Duration::from_millis(5),
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = GatewayConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.readiness.peer_grace, Duration::from_millis(500));
        assert_eq!(config.readiness.ceiling, Duration::from_secs(15));
        assert_eq!(
            config.readiness.playback_start_ceiling,
            Duration::from_secs(30)
        );
        assert_eq!(config.streaming.chunk_size, 262_144);
        assert_eq!(config.transcode.program, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_encoder_args_use_pipes_and_fragments() {
        let args = default_encoder_args();

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "pipe:0");
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
        assert!(args.contains(&"frag_keyframe+empty_moov+default_base_moof".to_string()));
    }

    #[test]
    fn test_testing_preset_is_faster() {
        let testing = GatewayConfig::for_testing();
        let default = GatewayConfig::default();

        assert!(testing.readiness.ceiling < default.readiness.ceiling);
        assert!(testing.readiness.peer_grace < default.readiness.peer_grace);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("UNDERTOW_PORT", "8088");
            std::env::set_var("UNDERTOW_PEER_GRACE_MS", "250");
            std::env::set_var("UNDERTOW_READY_TIMEOUT_SECS", "5");
            std::env::set_var("UNDERTOW_CHUNK_SIZE", "not-a-number");
        }

        let config = GatewayConfig::from_env();

        assert_eq!(config.server.port, 8088);
        assert_eq!(config.readiness.peer_grace, Duration::from_millis(250));
        assert_eq!(config.readiness.ceiling, Duration::from_secs(5));
        assert_eq!(config.streaming.chunk_size, 262_144);

        // Cleanup
        unsafe {
            std::env::remove_var("UNDERTOW_PORT");
            std::env::remove_var("UNDERTOW_PEER_GRACE_MS");
            std::env::remove_var("UNDERTOW_READY_TIMEOUT_SECS");
            std::env::remove_var("UNDERTOW_CHUNK_SIZE");
        }
    }
}
