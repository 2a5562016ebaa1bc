use crate::{db_core::prelude::*, error::AppResult};

pub struct CorrectionCtrl;

impl CorrectionCtrl {
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        correction: correction::ActiveModel,
    ) -> AppResult<correction::Model> {
        let model = correction.insert(conn).await?;
        Ok(model)
    }

    pub async fn get_by_classification<C: ConnectionTrait>(
        conn: &C,
        classification_id: i32,
    ) -> AppResult<Vec<correction::Model>> {
        let rows = Correction::find()
            .filter(correction::Column::ClassificationId.eq(classification_id))
            .order_by_asc(correction::Column::Id)
            .all(conn)
            .await?;
        Ok(rows)
    }
}
