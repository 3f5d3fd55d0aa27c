use crate::error::DBError;
use ambiental_core::Environment;

#[derive(sqlx::FromRow)]
pub struct EnvironmentDao {
    pub(crate) id: i32,
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) location: String,
    pub(crate) ideal_temperature: f64,
    pub(crate) ideal_humidity: f64,
}

impl From<EnvironmentDao> for Environment {
    fn from(val: EnvironmentDao) -> Self {
        Environment {
            id: val.id,
            name: val.name,
            description: val.description,
            location: val.location,
            ideal_temperature: val.ideal_temperature,
            ideal_humidity: val.ideal_humidity,
        }
    }
}

pub async fn find(conn: &sqlx::PgPool, environment_id: i32) -> Result<Option<Environment>, DBError> {
    Ok(sql_stmnt!(
        EnvironmentDao,
        r#"SELECT id, name, description, location, ideal_temperature, ideal_humidity
            FROM environments WHERE id = $1"#,
        environment_id
    )
    .fetch_optional(conn)
    .await?
    .map(Environment::from))
}
