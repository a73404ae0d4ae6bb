use async_trait::async_trait;

use crate::errors::StepError;
use crate::model::{ArchivedArtifact, ChangeCheck, StagedArtifact, StepContext};

/// Interfaz tipada de los steps del run.
///
/// Cada método corresponde a un `StepKind`. Las implementaciones deben ser
/// idempotentes: el executor puede invocar de nuevo un step tras un timeout o
/// un reinicio sin saber si el efecto del intento anterior llegó a aplicarse.
#[async_trait]
pub trait Activities: Send + Sync + 'static {
    /// Compara el tag remoto con el del puntero "latest". Sólo lectura.
    async fn check_for_change(&self, ctx: &StepContext) -> Result<ChangeCheck, StepError>;

    /// Descarga el recurso al staging de la sesión.
    async fn fetch(&self, ctx: &StepContext) -> Result<StagedArtifact, StepError>;

    /// Sube el artifact staged bajo la key fechada del run.
    async fn archive(&self, ctx: &StepContext, staged: &StagedArtifact) -> Result<ArchivedArtifact, StepError>;

    /// Copia server-side del artifact archivado al puntero "latest".
    async fn promote(&self, ctx: &StepContext, archived: &ArchivedArtifact) -> Result<(), StepError>;
}
