//! Interface de linha de comando do slidecast baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (serve, watch, purge)
//! e flags globais (--config, --verbose).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::job::JobId;

/// slidecast: serviço de renderização assíncrona de vídeos a partir de imagens.
#[derive(Debug, Parser)]
#[command(name = "slidecast", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração.
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe a API HTTP e os workers de renderização.
    Serve {
        /// Endereço de escuta; sobrescreve `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Acompanha um job no terminal até ele terminar.
    Watch {
        /// URL base da API, por exemplo `http://localhost:8080`.
        server: String,

        /// Id do job.
        job_id: JobId,

        /// Intervalo entre consultas, em segundos.
        #[arg(long, default_value_t = 2)]
        interval_secs: u64,
    },

    /// Remove os arquivos de um job do armazenamento compartilhado.
    Purge {
        /// Id do job.
        job_id: JobId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::parse_from(["slidecast", "serve", "--bind", "127.0.0.1:9000"]);
        match cli.command {
            Command::Serve { bind } => assert_eq!(bind.as_deref(), Some("127.0.0.1:9000")),
            _ => panic!("expected Serve command"),
        }
        assert_eq!(cli.config, PathBuf::from("slidecast.toml"));
    }

    #[test]
    fn cli_parses_watch_subcommand() {
        let cli = Cli::parse_from(["slidecast", "watch", "http://localhost:8080", "42"]);
        match cli.command {
            Command::Watch {
                server,
                job_id,
                interval_secs,
            } => {
                assert_eq!(server, "http://localhost:8080");
                assert_eq!(job_id, 42);
                assert_eq!(interval_secs, 2);
            }
            _ => panic!("expected Watch command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "slidecast",
            "--config",
            "/etc/slidecast.toml",
            "--verbose",
            "purge",
            "7",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/slidecast.toml"));
        assert!(matches!(cli.command, Command::Purge { job_id: 7 }));
    }

    #[test]
    fn cli_rejects_non_numeric_job_id() {
        assert!(Cli::try_parse_from(["slidecast", "purge", "abc"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
