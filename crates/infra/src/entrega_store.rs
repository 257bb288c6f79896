//! Delivery store implementations.
//!
//! Single-row read-modify-write semantics; the worker is the only writer of
//! confirmed state. The Postgres store maps `Entrega` onto the `entregas`
//! table with runtime-checked queries.

use std::collections::HashMap;
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use despacho_core::{EntregaId, PedidoId};
use despacho_logistica::{Entrega, EstadoEntrega};

#[derive(Debug, Clone, thiserror::Error)]
pub enum EntregaStoreError {
    #[error("entrega not found: {0}")]
    NotFound(EntregaId),

    #[error("storage error: {0}")]
    Storage(String),
}

#[async_trait]
pub trait EntregaStore: Send + Sync {
    /// Register a new delivery; the store assigns the id.
    async fn crear(
        &self,
        pedido_id: PedidoId,
        direccion: Option<String>,
    ) -> Result<Entrega, EntregaStoreError>;

    async fn obtener(&self, id: EntregaId) -> Result<Option<Entrega>, EntregaStoreError>;

    async fn listar(&self) -> Result<Vec<Entrega>, EntregaStoreError>;

    /// Persist the full current state of an existing delivery.
    async fn guardar(&self, entrega: &Entrega) -> Result<(), EntregaStoreError>;
}

/// In-memory delivery store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryEntregaStore {
    next_id: AtomicI64,
    rows: RwLock<HashMap<EntregaId, Entrega>>,
}

impl InMemoryEntregaStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl EntregaStore for InMemoryEntregaStore {
    async fn crear(
        &self,
        pedido_id: PedidoId,
        direccion: Option<String>,
    ) -> Result<Entrega, EntregaStoreError> {
        let id = EntregaId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entrega = Entrega::registrar(id, pedido_id, direccion);
        self.rows.write().unwrap().insert(id, entrega.clone());
        Ok(entrega)
    }

    async fn obtener(&self, id: EntregaId) -> Result<Option<Entrega>, EntregaStoreError> {
        Ok(self.rows.read().unwrap().get(&id).cloned())
    }

    async fn listar(&self) -> Result<Vec<Entrega>, EntregaStoreError> {
        let mut all: Vec<_> = self.rows.read().unwrap().values().cloned().collect();
        all.sort_by_key(|e| e.id);
        Ok(all)
    }

    async fn guardar(&self, entrega: &Entrega) -> Result<(), EntregaStoreError> {
        let mut rows = self.rows.write().unwrap();
        if !rows.contains_key(&entrega.id) {
            return Err(EntregaStoreError::NotFound(entrega.id));
        }
        rows.insert(entrega.id, entrega.clone());
        Ok(())
    }
}

/// Postgres-backed delivery store.
#[derive(Debug, Clone)]
pub struct PostgresEntregaStore {
    pool: PgPool,
}

impl PostgresEntregaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entrega(row: &sqlx::postgres::PgRow) -> Result<Entrega, EntregaStoreError> {
        let estado_raw: String = row
            .try_get("estado")
            .map_err(|e| EntregaStoreError::Storage(e.to_string()))?;
        let estado: EstadoEntrega = estado_raw
            .parse()
            .map_err(|e: despacho_core::DomainError| EntregaStoreError::Storage(e.to_string()))?;

        let get_opt = |name: &str| -> Result<Option<String>, EntregaStoreError> {
            row.try_get(name)
                .map_err(|e| EntregaStoreError::Storage(e.to_string()))
        };

        Ok(Entrega {
            id: EntregaId::new(
                row.try_get::<i64, _>("id")
                    .map_err(|e| EntregaStoreError::Storage(e.to_string()))?,
            ),
            pedido_id: PedidoId::new(
                row.try_get::<i64, _>("pedido_id")
                    .map_err(|e| EntregaStoreError::Storage(e.to_string()))?,
            ),
            estado,
            direccion: get_opt("direccion")?,
            nombre_recibe: get_opt("nombre_recibe")?,
            firma_recibe: get_opt("firma_recibe")?,
            integridad_firma: get_opt("integridad_firma")?,
            fecha_entrega: row
                .try_get::<Option<DateTime<Utc>>, _>("fecha_entrega")
                .map_err(|e| EntregaStoreError::Storage(e.to_string()))?,
        })
    }
}

#[async_trait]
impl EntregaStore for PostgresEntregaStore {
    async fn crear(
        &self,
        pedido_id: PedidoId,
        direccion: Option<String>,
    ) -> Result<Entrega, EntregaStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO entregas (pedido_id, estado, direccion)
            VALUES ($1, $2, $3)
            RETURNING id, pedido_id, estado, direccion, nombre_recibe,
                      firma_recibe, integridad_firma, fecha_entrega
            "#,
        )
        .bind(pedido_id.as_i64())
        .bind(EstadoEntrega::Registrada.as_str())
        .bind(&direccion)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| EntregaStoreError::Storage(e.to_string()))?;

        Self::row_to_entrega(&row)
    }

    async fn obtener(&self, id: EntregaId) -> Result<Option<Entrega>, EntregaStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, pedido_id, estado, direccion, nombre_recibe,
                   firma_recibe, integridad_firma, fecha_entrega
            FROM entregas
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| EntregaStoreError::Storage(e.to_string()))?;

        row.as_ref().map(Self::row_to_entrega).transpose()
    }

    async fn listar(&self) -> Result<Vec<Entrega>, EntregaStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, pedido_id, estado, direccion, nombre_recibe,
                   firma_recibe, integridad_firma, fecha_entrega
            FROM entregas
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EntregaStoreError::Storage(e.to_string()))?;

        rows.iter().map(Self::row_to_entrega).collect()
    }

    async fn guardar(&self, entrega: &Entrega) -> Result<(), EntregaStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE entregas
            SET estado = $2, direccion = $3, nombre_recibe = $4,
                firma_recibe = $5, integridad_firma = $6, fecha_entrega = $7
            WHERE id = $1
            "#,
        )
        .bind(entrega.id.as_i64())
        .bind(entrega.estado.as_str())
        .bind(&entrega.direccion)
        .bind(&entrega.nombre_recibe)
        .bind(&entrega.firma_recibe)
        .bind(&entrega.integridad_firma)
        .bind(entrega.fecha_entrega)
        .execute(&self.pool)
        .await
        .map_err(|e| EntregaStoreError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(EntregaStoreError::NotFound(entrega.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn crear_assigns_sequential_ids() {
        let store = InMemoryEntregaStore::new();
        let first = store.crear(PedidoId::new(1), None).await.unwrap();
        let second = store.crear(PedidoId::new(2), None).await.unwrap();

        assert_eq!(first.id, EntregaId::new(1));
        assert_eq!(second.id, EntregaId::new(2));
        assert_eq!(first.estado, EstadoEntrega::Registrada);
    }

    #[tokio::test]
    async fn guardar_round_trips_state() {
        let store = InMemoryEntregaStore::new();
        let mut entrega = store
            .crear(PedidoId::new(9), Some("Calle 1".to_string()))
            .await
            .unwrap();

        entrega.marcar_pendiente_confirmacion();
        store.guardar(&entrega).await.unwrap();

        let loaded = store.obtener(entrega.id).await.unwrap().unwrap();
        assert_eq!(loaded.estado, EstadoEntrega::PendingSystemConfirmation);
    }

    #[tokio::test]
    async fn guardar_unknown_id_is_an_error() {
        let store = InMemoryEntregaStore::new();
        let ghost = Entrega::registrar(EntregaId::new(99), PedidoId::new(1), None);
        assert!(matches!(
            store.guardar(&ghost).await,
            Err(EntregaStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn listar_is_ordered_by_id() {
        let store = InMemoryEntregaStore::new();
        for i in 0..3 {
            store.crear(PedidoId::new(i), None).await.unwrap();
        }
        let all = store.listar().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }
}
