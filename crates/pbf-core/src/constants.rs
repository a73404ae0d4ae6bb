//! Constantes del motor core.
//!
//! Valores estáticos compartidos por el controlador, los steps y los stores.
//! `ENGINE_VERSION` queda registrado en `RunInitialized`; cambiarlo no invalida
//! runs previos pero permite auditar con qué versión se ejecutaron.

/// Versión lógica del motor registrada en cada run.
pub const ENGINE_VERSION: &str = "P1.0";

/// Entrada de metadata (objeto durable) que transporta el version tag remoto.
pub const DEFAULT_VERSION_METADATA_KEY: &str = "geofabrik-etag";

/// Marcador que se elimina del basename al derivar la key fechada.
pub const LATEST_MARKER: &str = "-latest";

/// Formato de fecha del prefijo de la key archivada (fecha programada, UTC).
pub const ARCHIVE_DATE_FORMAT: &str = "%Y-%m-%d";
