/// Estado de un Step reconstruido a partir de eventos.
///
/// Las transiciones válidas son:
/// - `Pending` -> `Running`
/// - `Running` -> `FinishedOk` | `Failed`
/// - `Failed` -> `BackingOff` -> `Running`
/// - `FinishedOk` -> `Running` (sólo `Fetch`, al reanudar en otra sesión)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// El paso está pendiente de ejecución.
    Pending,
    /// Hay un intento en curso (o colgado, si el worker murió).
    Running,
    /// Hay un reintento agendado.
    BackingOff,
    /// El paso finalizó correctamente.
    FinishedOk,
    /// El último intento falló.
    Failed,
}
