//! Configuração do slidecast carregada a partir de `slidecast.toml`.
//!
//! A struct [`SlidecastConfig`] agrupa os parâmetros por seção
//! (`storage`, `engine`, `workers`, `server`, `tokens`).
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `SLIDECAST_STORAGE_ROOT`, `SLIDECAST_ENGINE_URL` e
//! `SLIDECAST_BIND` têm precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::RetryConfig;
use crate::pool::PoolConfig;
use crate::render::RenderClientConfig;

pub const DEFAULT_CONFIG_FILE: &str = "slidecast.toml";

/// Configuração de nível superior carregada de `slidecast.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlidecastConfig {
    pub storage: StorageConfig,
    pub engine: EngineConfig,
    pub workers: WorkersConfig,
    pub server: ServerConfig,
    /// Token bearer → id do dono.
    pub tokens: HashMap<String, String>,
}

/// Onde ficam os arquivos dos jobs e os registros.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Raiz compartilhada com o motor de renderização.
    pub root: PathBuf,
    /// Diretório dos registros JSON. Sem valor, os jobs ficam só em memória.
    pub records_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/app/shared-data/videos"),
            records_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub with_audio_path: String,
    pub without_audio_path: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Retentativas após um erro 5xx do motor.
    pub retries: u32,
    /// Atraso base em milissegundos para backoff exponencial.
    pub retry_base_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let client = RenderClientConfig::default();
        let retry = RetryConfig::default();
        Self {
            base_url: client.base_url,
            with_audio_path: client.with_audio_path,
            without_audio_path: client.without_audio_path,
            timeout_secs: client.timeout.as_secs(),
            connect_timeout_secs: client.connect_timeout.as_secs(),
            retries: retry.max_retries,
            retry_base_delay_ms: retry.base_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub core: usize,
    pub max: usize,
    pub queue_capacity: usize,
    pub shutdown_grace_secs: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            core: pool.core_workers,
            max: pool.max_workers,
            queue_capacity: pool.queue_capacity,
            shutdown_grace_secs: pool.shutdown_grace.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Limite do corpo multipart inteiro.
    ///
    /// Os uploads ficam em memória até um worker gravá-los em disco, então o
    /// pior caso é
    /// `(max(workers.max, workers.core) + workers.queue_capacity) * max_upload_bytes`.
    /// Com os defaults (10 + 100 jobs de 20 MiB) isso dá cerca de 2,2 GiB.
    pub max_upload_bytes: usize,
}

// Valor padrão do limite de upload: 20 MiB (até 10 imagens e um áudio).
fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl SlidecastConfig {
    /// Carrega a configuração de `slidecast.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Carrega de um caminho explícito; arquivo ausente também cai nos defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str::<SlidecastConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    // Variáveis de ambiente têm precedência sobre o arquivo. Valores vazios são ignorados.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(root) = var("SLIDECAST_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = var("SLIDECAST_ENGINE_URL") {
            self.engine.base_url = url;
        }
        if let Some(bind) = var("SLIDECAST_BIND") {
            self.server.bind = bind;
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            core_workers: self.workers.core,
            max_workers: self.workers.max,
            queue_capacity: self.workers.queue_capacity,
            shutdown_grace: Duration::from_secs(self.workers.shutdown_grace_secs),
        }
    }

    pub fn render_client_config(&self) -> RenderClientConfig {
        RenderClientConfig {
            base_url: self.engine.base_url.clone(),
            with_audio_path: self.engine.with_audio_path.clone(),
            without_audio_path: self.engine.without_audio_path.clone(),
            timeout: Duration::from_secs(self.engine.timeout_secs),
            connect_timeout: Duration::from_secs(self.engine.connect_timeout_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.engine.retries,
            base_delay_ms: self.engine.retry_base_delay_ms,
        }
    }

    /// Pior caso de memória ocupada por uploads ainda não gravados em disco.
    pub fn max_buffered_upload_bytes(&self) -> usize {
        let jobs = self
            .workers
            .max
            .max(self.workers.core)
            .saturating_add(self.workers.queue_capacity);
        jobs.saturating_mul(self.server.max_upload_bytes)
    }
}
