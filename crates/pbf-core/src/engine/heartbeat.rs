//! Señal de vida de un intento.
//!
//! El step recibe un `Heartbeat` dentro de su `StepContext` y llama a `beat`
//! mientras avanza. El executor vigila el `HeartbeatMonitor` en paralelo al
//! intento: si pasa `heartbeat_timeout` sin latidos, el intento se aborta con
//! `StepError::HeartbeatTimeout` y entra en la política de reintentos.
use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::errors::{millis, StepError};

#[derive(Debug, Clone)]
pub struct Heartbeat {
    tx: Arc<watch::Sender<u64>>,
}

#[derive(Debug)]
pub struct HeartbeatMonitor {
    rx: watch::Receiver<u64>,
}

impl Heartbeat {
    pub fn channel() -> (Heartbeat, HeartbeatMonitor) {
        let (tx, rx) = watch::channel(0);
        (Heartbeat { tx: Arc::new(tx) }, HeartbeatMonitor { rx })
    }

    /// Heartbeat sin monitor (tests de steps aislados).
    pub fn detached() -> Self {
        Self::channel().0
    }

    /// Registra un latido con el progreso actual (bytes, por ejemplo).
    pub fn beat(&self, progress: u64) {
        self.tx.send_replace(progress);
    }

    pub fn progress(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Ejecuta `fut` latiendo cada `every` hasta que termine. Para operaciones
    /// opacas (un upload completo) que no exponen progreso incremental.
    pub async fn keep_alive<F: Future>(&self, every: Duration, fut: F) -> F::Output {
        tokio::pin!(fut);
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                out = &mut fut => return out,
                _ = tick.tick() => self.beat(self.progress()),
            }
        }
    }
}

impl HeartbeatMonitor {
    /// Resuelve sólo si el intento deja de latir. Con `None` nunca resuelve.
    pub async fn stalled(mut self, timeout: Option<Duration>) -> StepError {
        let Some(limit) = timeout else {
            return pending().await;
        };
        loop {
            match tokio::time::timeout(limit, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                // El intento soltó su heartbeat: ya terminó.
                Ok(Err(_)) => return pending().await,
                Err(_) => return StepError::HeartbeatTimeout { after_ms: millis(limit) },
            }
        }
    }
}
