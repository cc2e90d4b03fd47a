//! Parámetros de ejecución del motor desde variables de entorno (.env).
//! Convención `FLOWMAP_*`; cualquier valor ausente o inválido usa el default.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use tokio::sync::Semaphore;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_POOL_SIZE: usize = 4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_PAGE_SIZE: usize = 500;
/// Tope de permisos que admite el semáforo del pool de cursores.
pub const MAX_POOL_SIZE: usize = Semaphore::MAX_PERMITS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Cursores que pueden correr a la vez (no afecta la corrección).
    pub pool_size: usize,
    /// Ventana de espera entre líneas de progreso mientras corren los cursores.
    pub poll_interval: Duration,
    /// Registros leídos por página al recorrer un dominio.
    pub page_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { pool_size: DEFAULT_POOL_SIZE,
               poll_interval: DEFAULT_POLL_INTERVAL,
               page_size: DEFAULT_PAGE_SIZE }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Lazy::force(&DOTENV_LOADED);
        let pool_size = clamp_pool_size(positive_var("FLOWMAP_POOL_SIZE").unwrap_or(DEFAULT_POOL_SIZE));
        let poll_interval = positive_var("FLOWMAP_POLL_INTERVAL_SECS").map(|s| Duration::from_secs(s as u64))
                                                                      .unwrap_or(DEFAULT_POLL_INTERVAL);
        let page_size = positive_var("FLOWMAP_PAGE_SIZE").unwrap_or(DEFAULT_PAGE_SIZE);
        Self { pool_size, poll_interval, page_size }
    }

    pub fn with_pool_size(mut self, n: usize) -> Self {
        self.pool_size = clamp_pool_size(n);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_page_size(mut self, n: usize) -> Self {
        self.page_size = n.max(1);
        self
    }
}

pub(crate) fn clamp_pool_size(n: usize) -> usize { n.clamp(1, MAX_POOL_SIZE) }

fn positive_var(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.trim().parse::<usize>().ok()).filter(|v| *v > 0)
}
