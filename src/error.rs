//! Error types shared by the playback engine and its collaborators.

use thiserror::Error;

/// Errors raised by the queue and the per-guild player.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The operation needs a current track but the queue is empty.
    #[error("La cola está vacía")]
    EmptyQueue,

    /// Jump/remove/move index outside the queue.
    #[error("Índice fuera de rango: {index} (cola de {len} canciones)")]
    IndexOutOfBounds { index: usize, len: usize },

    /// The queue already holds the maximum number of entries.
    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    /// Resolver or sink failed to start a track. The cursor is left untouched.
    #[error("No se pudo iniciar la reproducción: {0}")]
    PlaybackStart(String),

    /// Autoplay requested but no usable related track was found.
    #[error("No hay canciones relacionadas disponibles")]
    NoCandidates,

    /// No voice connection is attached to the player.
    #[error("No hay conexión de voz activa")]
    NotConnected,

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Failures reported by a track resolver. Surfaced verbatim to users.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("El contenido no está disponible en esta región")]
    RegionBlocked,

    #[error("El enlace de la canción expiró")]
    Expired,

    #[error("Error del proveedor: {0}")]
    Backend(String),
}

/// Failures reported by the audio sink.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("Error al unirse al canal de voz: {0}")]
    Connect(String),

    #[error("Error de reproducción: {0}")]
    Playback(String),

    #[error("La conexión de voz ya no existe")]
    Disconnected,
}

/// Failures reported by the guild config store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuración inválida: {0}")]
    Format(#[from] serde_json::Error),
}

pub type PlayerResult<T> = std::result::Result<T, PlayerError>;
