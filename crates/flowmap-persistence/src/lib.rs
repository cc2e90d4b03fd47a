//! flowmap-persistence
//!
//! Backend Postgres (Diesel) del motor de reemplazo: implementa `FlowStore`
//! sobre las tablas de flujos, unidades, factores de propiedad, intercambios
//! y factores de impacto.
//!
//! Módulos:
//! - `pg`: `PgFlowStore`, proveedor de conexiones y construcción del pool.
//! - `migrations`: runner embebido de migraciones Diesel.
//! - `config`: carga de configuración desde .env.
//! - `schema`: tablas Diesel declaradas para compilar queries.

pub mod config;
pub mod error;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{init_dotenv, DbConfig};
pub use error::PersistenceError;
pub use pg::{build_dev_pool_from_env, build_pool, ConnectionProvider, PgFlowStore, PgPool, PoolProvider};
