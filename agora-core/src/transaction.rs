//! Unit of Work implementation
//!
//! Groups several repository writes into one transaction. Dropping an
//! uncommitted unit rolls it back.

use sqlx::{PgPool, Postgres, Transaction};

use crate::Result;

pub struct UnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl UnitOfWork {
    /// Begin a new transaction
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self { tx })
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Executor for statements that belong to this unit
    pub fn transaction(&mut self) -> &mut Transaction<'static, Postgres> {
        &mut self.tx
    }
}
