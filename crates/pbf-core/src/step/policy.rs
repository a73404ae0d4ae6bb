//! Políticas de ejecución por step y por sesión.
//!
//! Los valores por defecto reproducen el despliegue original: sesión de 1 min
//! de creación y 30 min de ejecución; steps de 25 min con 3 intentos y backoff
//! exponencial (1s, x2.0, tope 1 min); heartbeat de 5s sólo en los steps
//! largos (`Fetch`, `Archive`).
use std::time::Duration;

use crate::errors::{classify_error, ErrorClass, StepError};
use crate::step::StepKind;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Intentos totales (incluye el primero).
    pub maximum_attempts: u32,
    pub non_retryable: Vec<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { initial_interval: Duration::from_secs(1),
               backoff_coefficient: 2.0,
               maximum_interval: Duration::from_secs(60),
               maximum_attempts: 3,
               non_retryable: vec![ErrorClass::Permanent] }
    }
}

impl RetryPolicy {
    /// Espera antes del intento `attempt + 1`, tras fallar el intento `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let coefficient = if self.backoff_coefficient.is_finite() && self.backoff_coefficient >= 1.0 {
            self.backoff_coefficient
        } else {
            1.0
        };
        let secs = self.initial_interval.as_secs_f64() * coefficient.powi(exp);
        let capped = secs.min(self.maximum_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.maximum_interval)
    }

    pub fn is_retryable(&self, error: &StepError) -> bool {
        !self.non_retryable.contains(&classify_error(error))
    }

    /// Política en milisegundos, útil en tests.
    pub fn fast(maximum_attempts: u32) -> Self {
        Self { initial_interval: Duration::from_millis(5),
               maximum_interval: Duration::from_millis(20),
               maximum_attempts,
               ..Self::default() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOptions {
    /// Límite de un intento, de inicio a fin.
    pub start_to_close: Duration,
    /// Ventana máxima sin heartbeat; `None` desactiva la vigilancia.
    pub heartbeat_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl StepOptions {
    pub fn short() -> Self {
        Self { start_to_close: Duration::from_secs(25 * 60),
               heartbeat_timeout: None,
               retry: RetryPolicy::default() }
    }

    pub fn long_running() -> Self {
        Self { heartbeat_timeout: Some(Duration::from_secs(5)),
               ..Self::short() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub creation_timeout: Duration,
    pub execution_timeout: Duration,
    /// Vigencia del lease del run; se renueva cada tercio mientras corre.
    pub lease_ttl: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { creation_timeout: Duration::from_secs(60),
               execution_timeout: Duration::from_secs(30 * 60),
               lease_ttl: Duration::from_secs(60) }
    }
}

/// Opciones completas de un run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOptions {
    pub session: SessionOptions,
    pub check: StepOptions,
    pub fetch: StepOptions,
    pub archive: StepOptions,
    pub promote: StepOptions,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self { session: SessionOptions::default(),
               check: StepOptions::short(),
               fetch: StepOptions::long_running(),
               archive: StepOptions::long_running(),
               promote: StepOptions::short() }
    }
}

impl WorkflowOptions {
    pub fn for_step(&self, step: StepKind) -> &StepOptions {
        match step {
            StepKind::CheckForChange => &self.check,
            StepKind::Fetch => &self.fetch,
            StepKind::Archive => &self.archive,
            StepKind::Promote => &self.promote,
        }
    }

    /// Aplica la misma política de reintentos a todos los steps.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        for opts in [&mut self.check, &mut self.fetch, &mut self.archive, &mut self.promote] {
            opts.retry = retry.clone();
        }
        self
    }
}
