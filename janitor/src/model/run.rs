use crate::{db_core::prelude::*, error::AppResult};

pub struct RunCtrl;

impl RunCtrl {
    pub async fn insert<C: ConnectionTrait>(conn: &C, run: run::ActiveModel) -> AppResult<()> {
        Run::insert(run).exec_without_returning(conn).await?;
        Ok(())
    }

    pub async fn get<C: ConnectionTrait>(conn: &C, run_id: &str) -> AppResult<Option<run::Model>> {
        let run = Run::find_by_id(run_id.to_string()).one(conn).await?;
        Ok(run)
    }

    /// Most recent runs first
    pub async fn list_recent<C: ConnectionTrait>(
        conn: &C,
        limit: u64,
    ) -> AppResult<Vec<run::Model>> {
        let runs = Run::find()
            .order_by_desc(run::Column::StartedAt)
            .limit(limit)
            .all(conn)
            .await?;
        Ok(runs)
    }
}
