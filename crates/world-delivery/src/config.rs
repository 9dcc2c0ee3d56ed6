//! Configuración de entrega leída del entorno (.env opcional).
//!
//! Variables: `WORLD_DELIVER_TO`, `WORLD_QUEUE_MAX_ATTEMPTS`,
//! `WORLD_QUEUE_MAX_INTERVAL_SECS`, `WORLD_QUEUE_INITIAL_INTERVAL_MS`,
//! `WORLD_QUEUE_KILL_ON_EXHAUSTION`, `WORLD_HTTP_TIMEOUT_SECS`. Valores
//! ausentes o inválidos caen al default.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

pub(crate) fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Reintento acotado para fallos de transporte y respuestas rechazadas.
/// Independiente del reintento por 503, que no tiene tope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Al agotar intentos termina con `Exhausted` en vez del último error.
    pub kill_on_exhaustion: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 10,
               initial_interval: Duration::from_millis(100),
               max_interval: Duration::from_secs(6),
               kill_on_exhaustion: true }
    }
}

impl RetryPolicy {
    /// Sin reintentos: un único intento.
    pub fn none() -> Self {
        Self { max_attempts: 1,
               ..Self::default() }
    }

    /// Espera antes del intento `failed + 1`: exponencial, con tope.
    pub fn backoff(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(31);
        self.initial_interval
            .saturating_mul(1u32 << exp)
            .min(self.max_interval)
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub deliver_to: String,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { deliver_to: "http://localhost:3000".to_string(),
               retry: RetryPolicy::default(),
               http_timeout: Duration::from_secs(30) }
    }
}

impl DeliveryConfig {
    pub fn from_env() -> Self {
        init_dotenv();
        let defaults = Self::default();
        let retry = RetryPolicy { max_attempts: env_or("WORLD_QUEUE_MAX_ATTEMPTS", defaults.retry.max_attempts).max(1),
                                  initial_interval: Duration::from_millis(env_or("WORLD_QUEUE_INITIAL_INTERVAL_MS", 100)),
                                  max_interval: Duration::from_secs(env_or("WORLD_QUEUE_MAX_INTERVAL_SECS", 6)),
                                  kill_on_exhaustion: env_or("WORLD_QUEUE_KILL_ON_EXHAUSTION",
                                                             defaults.retry.kill_on_exhaustion) };
        Self { deliver_to: env_or("WORLD_DELIVER_TO", defaults.deliver_to),
               retry,
               http_timeout: Duration::from_secs(env_or("WORLD_HTTP_TIMEOUT_SECS", 30)) }
    }

    pub fn with_deliver_to(mut self, deliver_to: impl Into<String>) -> Self {
        self.deliver_to = deliver_to.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(9), Duration::from_secs(6));
        assert_eq!(policy.backoff(40), Duration::from_secs(6));
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        // nombre único para no chocar con otros tests
        env::set_var("WORLD_TEST_GARBAGE_U32", "not-a-number");
        assert_eq!(env_or::<u32>("WORLD_TEST_GARBAGE_U32", 7), 7);
        env::set_var("WORLD_TEST_VALID_BOOL", "false");
        assert!(!env_or("WORLD_TEST_VALID_BOOL", true));
        assert_eq!(env_or::<u32>("WORLD_TEST_UNSET_KEY", 3), 3);
    }
}
