//! Implementación Postgres (Diesel) de `FlowStore`.
//!
//! Objetivo general del módulo:
//! - Proveer el backend durable del motor con paridad 1:1 respecto al
//!   backend en memoria (orden de scan por id, borrado restringido).
//! - Cada actualización de registro se confirma en su propia transacción; no
//!   hay transacciones entre registros.
//! - Aislar completamente el mapeo dominio ↔ filas de DB del `flowmap-core`.
//! - Manejo básico de errores transitorios: reintento con backoff en todas
//!   las operaciones.

use std::collections::HashSet;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use flowmap_core::{FlowPropertyFactor, FlowStore, StoreError, UnitFactor};
use flowmap_domain::{Domain, DomainRecord, FlowId, NewFlow, RecordUpdate, ResolvedFlow};
use log::{debug, warn};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;
use crate::schema::{exchanges, flow_property_factors, flows, impact_factors, units};

/// Alias de tipo para el pool r2d2 de conexiones Postgres.
///
/// Al construirlo se corre automáticamente el set de migraciones pendientes
/// (una sola vez).
pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;

type PgPooled = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Proveedor abstracto de conexiones.
///
/// Permite inyectar un pool real (producción/tests de integración) o
/// simularlo en tests unitarios sin acoplar a r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    /// Obtiene una conexión lista para ejecutar consultas Diesel.
    fn connection(&self) -> Result<PgPooled, PersistenceError>;
}

/// Implementación concreta de `ConnectionProvider` respaldada por un `PgPool`.
pub struct PoolProvider {
    pub pool: PgPool,
}
impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooled, PersistenceError> {
        self.pool
            .get()
            .map_err(|e| PersistenceError::TransientIo(format!("pool error: {e}")))
    }
}

/// Fila mapeada de la tabla `flows`.
#[derive(Queryable, Debug)]
pub struct FlowRow {
    pub id: i64,
    pub ref_id: Uuid,
    pub name: String,
    pub category: Option<String>,
    pub reference_unit: String,
    pub reference_quantity: String,
}

impl From<FlowRow> for ResolvedFlow {
    fn from(row: FlowRow) -> Self {
        ResolvedFlow { id: row.id,
                       ref_id: row.ref_id,
                       name: row.name,
                       reference_unit: row.reference_unit,
                       reference_quantity: row.reference_quantity }
    }
}

/// Fila para insertar en `flows`; `id` lo asigna el BIGSERIAL.
#[derive(Insertable, Debug)]
#[diesel(table_name = flows)]
pub struct NewFlowRow<'a> {
    pub ref_id: &'a Uuid,
    pub name: &'a str,
    pub category: Option<&'a str>,
    pub reference_unit: &'a str,
    pub reference_quantity: &'a str,
}

/// Determina si un error es transitorio (recomendado reintentar con backoff).
fn is_retryable(e: &PersistenceError) -> bool {
    match e {
        PersistenceError::SerializationConflict => true,
        PersistenceError::TransientIo(_) => true,
        // best-effort por texto, sin acoplar a SQLSTATE
        PersistenceError::Unknown(msg) => {
            let m = msg.to_lowercase();
            m.contains("deadlock detected")
            || m.contains("could not serialize access due to concurrent update")
            || m.contains("terminating connection due to administrator command")
            || m.contains("connection closed")
            || m.contains("connection refused")
            || m.contains("timeout")
        }
        _ => false,
    }
}

/// Retry simple con backoff muy pequeño (hasta 3 reintentos: 15ms, 30ms, 45ms).
fn with_retry<F, T>(mut f: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    let mut attempts = 0;
    loop {
        match f() {
            Err(e) if is_retryable(&e) && attempts < 3 => {
                let delay_ms = 15 * ((attempts + 1) as u64);
                warn!("retryable error (attempt {}): {:?} -> sleeping {}ms",
                      attempts + 1,
                      e,
                      delay_ms);
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                attempts += 1;
            }
            r => return r,
        }
    }
}

type RecordRow = (i64, i64, i64, f64, String);

fn to_record((id, owner_id, flow_id, amount, unit): RecordRow) -> DomainRecord {
    DomainRecord { id, owner_id, flow_id, amount, unit }
}

/// Implementación Postgres de `FlowStore`.
pub struct PgFlowStore<P: ConnectionProvider> {
    pub provider: P,
}

impl<P: ConnectionProvider> PgFlowStore<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Alta (o actualización) de una unidad en la tabla de unidades.
    pub fn upsert_unit(&self, unit: &UnitFactor) -> Result<(), PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(units::table).values((units::name.eq(&unit.name),
                                                      units::quantity.eq(&unit.quantity),
                                                      units::factor.eq(unit.factor)))
                                             .on_conflict(units::name)
                                             .do_update()
                                             .set((units::quantity.eq(&unit.quantity), units::factor.eq(unit.factor)))
                                             .execute(&mut conn)?;
            Ok(())
        })
    }

    pub fn upsert_property_factor(&self, factor: &FlowPropertyFactor) -> Result<(), PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            diesel::insert_into(flow_property_factors::table)
                .values((flow_property_factors::flow_id.eq(factor.flow_id),
                         flow_property_factors::quantity.eq(&factor.quantity),
                         flow_property_factors::factor.eq(factor.factor)))
                .on_conflict((flow_property_factors::flow_id, flow_property_factors::quantity))
                .do_update()
                .set(flow_property_factors::factor.eq(factor.factor))
                .execute(&mut conn)?;
            Ok(())
        })
    }

    /// Inserta un registro en el dominio y devuelve su id.
    pub fn insert_record(&self, domain: Domain, owner_id: i64, flow_id: FlowId, amount: f64, unit: &str) -> Result<i64, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let id = match domain {
                Domain::Exchanges => diesel::insert_into(exchanges::table)
                    .values((exchanges::process_id.eq(owner_id),
                             exchanges::flow_id.eq(flow_id),
                             exchanges::amount.eq(amount),
                             exchanges::unit.eq(unit)))
                    .returning(exchanges::id)
                    .get_result::<i64>(&mut conn)?,
                Domain::Impacts => diesel::insert_into(impact_factors::table)
                    .values((impact_factors::impact_category_id.eq(owner_id),
                             impact_factors::flow_id.eq(flow_id),
                             impact_factors::value.eq(amount),
                             impact_factors::unit.eq(unit)))
                    .returning(impact_factors::id)
                    .get_result::<i64>(&mut conn)?,
            };
            Ok(id)
        })
    }

    fn load_page(&self, domain: Domain, after: Option<i64>, limit: i64) -> Result<Vec<RecordRow>, PersistenceError> {
        with_retry(|| {
            let mut conn = self.provider.connection()?;
            let rows = match domain {
                Domain::Exchanges => {
                    let mut q = exchanges::table.select((exchanges::id,
                                                         exchanges::process_id,
                                                         exchanges::flow_id,
                                                         exchanges::amount,
                                                         exchanges::unit))
                                                .order(exchanges::id.asc())
                                                .limit(limit)
                                                .into_boxed();
                    if let Some(after) = after {
                        q = q.filter(exchanges::id.gt(after));
                    }
                    q.load::<RecordRow>(&mut conn)?
                }
                Domain::Impacts => {
                    let mut q = impact_factors::table.select((impact_factors::id,
                                                              impact_factors::impact_category_id,
                                                              impact_factors::flow_id,
                                                              impact_factors::value,
                                                              impact_factors::unit))
                                                     .order(impact_factors::id.asc())
                                                     .limit(limit)
                                                     .into_boxed();
                    if let Some(after) = after {
                        q = q.filter(impact_factors::id.gt(after));
                    }
                    q.load::<RecordRow>(&mut conn)?
                }
            };
            Ok(rows)
        })
    }
}

impl<P: ConnectionProvider> FlowStore for PgFlowStore<P> {
    fn find_flow(&self, ref_id: &Uuid) -> Result<Option<ResolvedFlow>, StoreError> {
        let row = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(flows::table.filter(flows::ref_id.eq(ref_id)).first::<FlowRow>(&mut conn).optional()?)
        })?;
        Ok(row.map(ResolvedFlow::from))
    }

    fn get_flow(&self, id: FlowId) -> Result<Option<ResolvedFlow>, StoreError> {
        let row = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(flows::table.find(id).first::<FlowRow>(&mut conn).optional()?)
        })?;
        Ok(row.map(ResolvedFlow::from))
    }

    fn insert_flow(&self, flow: &NewFlow) -> Result<ResolvedFlow, StoreError> {
        debug!("insert_flow:start ref_id={}", flow.ref_id);
        // flujo y factor de su magnitud de referencia en la misma transacción
        let row = with_retry(|| {
            let mut conn = self.provider.connection()?;
            conn.build_transaction()
                .read_write()
                .run(|tx_conn| {
                    let row: FlowRow = diesel::insert_into(flows::table)
                        .values(NewFlowRow { ref_id: &flow.ref_id,
                                             name: &flow.name,
                                             category: flow.category.as_deref(),
                                             reference_unit: &flow.reference_unit,
                                             reference_quantity: &flow.reference_quantity })
                        .get_result(tx_conn)?;
                    diesel::insert_into(flow_property_factors::table)
                        .values((flow_property_factors::flow_id.eq(row.id),
                                 flow_property_factors::quantity.eq(&flow.reference_quantity),
                                 flow_property_factors::factor.eq(1.0)))
                        .on_conflict_do_nothing()
                        .execute(tx_conn)?;
                    Ok::<FlowRow, diesel::result::Error>(row)
                })
                .map_err(PersistenceError::from)
        })?;
        debug!("insert_flow:done ref_id={} id={}", flow.ref_id, row.id);
        Ok(row.into())
    }

    fn delete_flow(&self, id: FlowId) -> Result<(), StoreError> {
        let deleted = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(diesel::delete(flows::table.find(id)).execute(&mut conn)?)
        })?;
        if deleted == 0 {
            return Err(StoreError::NotFound(format!("flow {id}")));
        }
        Ok(())
    }

    fn used_flows(&self) -> Result<HashSet<FlowId>, StoreError> {
        let used = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let mut used: HashSet<FlowId> = exchanges::table.select(exchanges::flow_id)
                                                            .distinct()
                                                            .load::<i64>(&mut conn)?
                                                            .into_iter()
                                                            .collect();
            used.extend(impact_factors::table.select(impact_factors::flow_id).distinct().load::<i64>(&mut conn)?);
            Ok(used)
        })?;
        debug!("used_flows: {} flows in use", used.len());
        Ok(used)
    }

    fn scan(&self, domain: Domain, after: Option<i64>, limit: usize) -> Result<Vec<DomainRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.load_page(domain, after, limit)?;
        debug!("scan {domain} after={after:?} -> {} rows", rows.len());
        Ok(rows.into_iter().map(to_record).collect())
    }

    fn update_record(&self, domain: Domain, update: &RecordUpdate) -> Result<(), StoreError> {
        let changed = with_retry(|| {
            let mut conn = self.provider.connection()?;
            let n = match domain {
                Domain::Exchanges => diesel::update(exchanges::table.find(update.record_id))
                    .set((exchanges::flow_id.eq(update.flow_id),
                          exchanges::amount.eq(update.amount),
                          exchanges::unit.eq(&update.unit)))
                    .execute(&mut conn)?,
                Domain::Impacts => diesel::update(impact_factors::table.find(update.record_id))
                    .set((impact_factors::flow_id.eq(update.flow_id),
                          impact_factors::value.eq(update.amount),
                          impact_factors::unit.eq(&update.unit)))
                    .execute(&mut conn)?,
            };
            Ok(n)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("{} record {}", domain.label(), update.record_id)));
        }
        Ok(())
    }

    fn units(&self) -> Result<Vec<UnitFactor>, StoreError> {
        let rows = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(units::table.select((units::name, units::quantity, units::factor))
                           .load::<(String, String, f64)>(&mut conn)?)
        })?;
        Ok(rows.into_iter().map(|(name, quantity, factor)| UnitFactor { name, quantity, factor }).collect())
    }

    fn flow_property_factors(&self) -> Result<Vec<FlowPropertyFactor>, StoreError> {
        let rows = with_retry(|| {
            let mut conn = self.provider.connection()?;
            Ok(flow_property_factors::table.select((flow_property_factors::flow_id,
                                                    flow_property_factors::quantity,
                                                    flow_property_factors::factor))
                                           .load::<(i64, String, f64)>(&mut conn)?)
        })?;
        Ok(rows.into_iter()
               .map(|(flow_id, quantity, factor)| FlowPropertyFactor { flow_id, quantity, factor })
               .collect())
    }
}

/// Construye un pool Postgres r2d2 a partir de URL.
///
/// Comportamiento:
/// - Valida y ajusta tamaños (si `min_size > max_size`, usa `min_size =
///   max_size`).
/// - Ejecuta migraciones inmediatamente tras el primer `get()`.
/// - Devuelve `PersistenceError::TransientIo` ante errores del pool/manager.
pub fn build_pool(database_url: &str, min_size: u32, max_size: u32) -> Result<PgPool, PersistenceError> {
    let validated_min = if min_size == 0 { 1 } else { min_size };
    let validated_max = if max_size == 0 { 1 } else { max_size };
    if validated_min > validated_max {
        warn!("min_size > max_size ({} > {}), ajustando min=max", validated_min, validated_max);
    }
    let final_min = validated_min.min(validated_max);
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().min_idle(Some(final_min))
                                    .max_size(validated_max)
                                    .build(manager)
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    {
        let mut conn = pool.get()
                           .map_err(|e| PersistenceError::TransientIo(format!("pool get for migrations: {e}")))?;
        run_pending_migrations(&mut conn)?;
    }
    Ok(pool)
}

/// Helper de desarrollo: carga `.env`, lee configuración (DATABASE_URL,
/// tamaños) y construye un pool ya migrado.
pub fn build_dev_pool_from_env() -> Result<PgPool, PersistenceError> {
    crate::config::init_dotenv();
    let cfg = crate::config::DbConfig::from_env()?;
    build_pool(&cfg.url, cfg.min_connections, cfg.max_connections)
}
