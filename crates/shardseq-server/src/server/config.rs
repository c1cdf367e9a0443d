use anyhow::bail;
use clap::Parser;
use shardseq::DEFAULT_CHUNK;

/// Runtime configuration for the `shardseq-server` binary.
///
/// All values are parsed from CLI arguments or environment variables. Request
/// parameters that are left out fall back to these.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "shardseq-server",
    version,
    about = "An HTTP harness for load and consistency testing of shardseq allocators"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3000"))]
    pub server_addr: String,

    /// Chunk size used when a request does not name one.
    ///
    /// Environment variable: `DEFAULT_CHUNK`
    #[arg(long, env = "DEFAULT_CHUNK", default_value_t = DEFAULT_CHUNK)]
    pub default_chunk: u64,

    /// Largest number of ids a single `/scale` call may ask for.
    ///
    /// Environment variable: `MAX_REQUEST_SIZE`
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value_t = 1_000)]
    pub max_request_size: u64,

    /// Number of allocation calls made per `/scale` request.
    ///
    /// Environment variable: `OPS_PER_REQUEST`
    #[arg(long, env = "OPS_PER_REQUEST", default_value_t = 10)]
    pub ops_per_request: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub default_chunk: u64,
    pub max_request_size: u64,
    pub ops_per_request: usize,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_request_size == 0 {
            bail!("MAX_REQUEST_SIZE must be greater than 0");
        }

        if args.ops_per_request == 0 {
            bail!("OPS_PER_REQUEST must be greater than 0");
        }

        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            default_chunk: args.default_chunk,
            max_request_size: args.max_request_size,
            ops_per_request: args.ops_per_request,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(std::iter::once("shardseq-server").chain(args.iter().copied()))?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--server-addr",
            "127.0.0.1:8080",
            "--default-chunk",
            "16",
            "--ops-per-request",
            "3",
        ])
        .unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.default_chunk, 16);
        assert_eq!(config.ops_per_request, 3);
    }

    #[test]
    fn rejects_zero_limits() {
        let err = parse(&["--max-request-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("MAX_REQUEST_SIZE"));

        let err = parse(&["--ops-per-request", "0"]).unwrap_err();
        assert!(err.to_string().contains("OPS_PER_REQUEST"));
    }
}
