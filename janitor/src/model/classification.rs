use crate::{db_core::prelude::*, error::AppResult};

pub struct ClassificationCtrl;

impl ClassificationCtrl {
    pub async fn insert_many<C: ConnectionTrait>(
        conn: &C,
        rows: Vec<classification::ActiveModel>,
    ) -> AppResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        Classification::insert_many(rows)
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }

    pub async fn count_by_run<C: ConnectionTrait>(conn: &C, run_id: &str) -> AppResult<u64> {
        let count = Classification::find()
            .filter(classification::Column::RunId.eq(run_id))
            .count(conn)
            .await?;
        Ok(count)
    }

    pub async fn get_by_run<C: ConnectionTrait>(
        conn: &C,
        run_id: &str,
    ) -> AppResult<Vec<classification::Model>> {
        let rows = Classification::find()
            .filter(classification::Column::RunId.eq(run_id))
            .order_by_asc(classification::Column::Id)
            .all(conn)
            .await?;
        Ok(rows)
    }

    pub async fn get_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> AppResult<Option<classification::Model>> {
        let row = Classification::find_by_id(id).one(conn).await?;
        Ok(row)
    }
}
