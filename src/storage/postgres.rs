//! # PostgreSQL Store
//!
//! [`Store`] over a `sqlx` Postgres pool. Rows are decoded into private row
//! structs and converted into domain models; status columns hold the
//! SCREAMING_SNAKE_CASE names of the state enums.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use super::{RunSummary, Store, StoreError, StoreResult};
use crate::models::{
    Batch, BindingBox, Conformer, DockingResult, Ligand, Protein, ReceptorMeta, Run, RunOptions,
    Task,
};
use crate::state_machine::{LigandStatus, RunStatus, TaskState};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and bring the schema up to date
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_status<T: std::str::FromStr>(entity: &'static str, value: &str) -> StoreResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| StoreError::Corrupt {
        entity,
        reason: e.to_string(),
    })
}

fn to_u32(entity: &'static str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        entity,
        reason: format!("negative counter {value}"),
    })
}

#[derive(FromRow)]
struct LigandRow {
    ligand_id: Uuid,
    created_at: DateTime<Utc>,
    name: Option<String>,
    smiles: Option<String>,
    molfile: Option<String>,
    status: String,
    error: Option<String>,
}

impl TryFrom<LigandRow> for Ligand {
    type Error = StoreError;

    fn try_from(row: LigandRow) -> StoreResult<Self> {
        Ok(Ligand {
            ligand_id: row.ligand_id,
            created_at: row.created_at,
            name: row.name,
            smiles: row.smiles,
            molfile: row.molfile,
            status: parse_status("ligand", &row.status)?,
            error: row.error,
        })
    }
}

#[derive(FromRow)]
struct ConformerRow {
    conformer_id: Uuid,
    ligand_id: Uuid,
    idx: i32,
    status: String,
    pdb_path: Option<String>,
    pdbqt_path: Option<String>,
}

impl TryFrom<ConformerRow> for Conformer {
    type Error = StoreError;

    fn try_from(row: ConformerRow) -> StoreResult<Self> {
        Ok(Conformer {
            conformer_id: row.conformer_id,
            ligand_id: row.ligand_id,
            idx: to_u32("conformer", row.idx)?,
            status: parse_status("conformer", &row.status)?,
            pdb_path: row.pdb_path,
            pdbqt_path: row.pdbqt_path,
        })
    }
}

#[derive(FromRow)]
struct ProteinRow {
    protein_id: String,
    name: String,
    category: Option<String>,
    organism: Option<String>,
    source_id: Option<String>,
    receptor_path: String,
    receptor_meta: Json<ReceptorMeta>,
    default_box: Option<Json<BindingBox>>,
    pocket_method: Option<String>,
}

impl TryFrom<ProteinRow> for Protein {
    type Error = StoreError;

    fn try_from(row: ProteinRow) -> StoreResult<Self> {
        let pocket_method = row
            .pocket_method
            .as_deref()
            .map(|m| parse_status("protein", m))
            .transpose()?;
        Ok(Protein {
            protein_id: row.protein_id,
            name: row.name,
            category: row.category,
            organism: row.organism,
            source_id: row.source_id,
            receptor_path: row.receptor_path,
            receptor_meta: row.receptor_meta.0,
            default_box: row.default_box.map(|b| b.0),
            pocket_method,
        })
    }
}

#[derive(FromRow)]
struct BatchRow {
    batch_id: Uuid,
    created_at: DateTime<Utc>,
    name: Option<String>,
    preset: String,
    options: Json<RunOptions>,
}

impl From<BatchRow> for Batch {
    fn from(row: BatchRow) -> Self {
        Batch {
            batch_id: row.batch_id,
            created_at: row.created_at,
            name: row.name,
            preset: row.preset,
            options: row.options.0,
        }
    }
}

#[derive(FromRow)]
struct RunRow {
    run_id: Uuid,
    created_at: DateTime<Utc>,
    ligand_id: Uuid,
    batch_id: Option<Uuid>,
    preset: String,
    options: Json<RunOptions>,
    status: String,
    total_tasks: i32,
    done_tasks: i32,
    failed_tasks: i32,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> StoreResult<Self> {
        Ok(Run {
            run_id: row.run_id,
            created_at: row.created_at,
            ligand_id: row.ligand_id,
            batch_id: row.batch_id,
            preset: row.preset,
            options: row.options.0,
            status: parse_status("run", &row.status)?,
            total_tasks: to_u32("run", row.total_tasks)?,
            done_tasks: to_u32("run", row.done_tasks)?,
            failed_tasks: to_u32("run", row.failed_tasks)?,
        })
    }
}

#[derive(FromRow)]
struct TaskRow {
    task_id: Uuid,
    run_id: Uuid,
    protein_id: String,
    conformer_id: Option<Uuid>,
    status: String,
    attempts: i32,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    log_path: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> StoreResult<Self> {
        Ok(Task {
            task_id: row.task_id,
            run_id: row.run_id,
            protein_id: row.protein_id,
            conformer_id: row.conformer_id,
            status: parse_status("task", &row.status)?,
            attempts: to_u32("task", row.attempts)?,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            error: row.error,
            log_path: row.log_path,
        })
    }
}

#[derive(FromRow)]
struct ResultRow {
    result_id: Uuid,
    task_id: Uuid,
    created_at: DateTime<Utc>,
    best_score: Option<f64>,
    pose_paths: Json<Vec<String>>,
    metrics: serde_json::Value,
}

impl From<ResultRow> for DockingResult {
    fn from(row: ResultRow) -> Self {
        DockingResult {
            result_id: row.result_id,
            task_id: row.task_id,
            created_at: row.created_at,
            best_score: row.best_score,
            pose_paths: row.pose_paths.0,
            metrics: row.metrics,
        }
    }
}

const TASK_COLUMNS: &str = "task_id, run_id, protein_id, conformer_id, status, attempts, \
     created_at, started_at, finished_at, error, log_path";

const RUN_COLUMNS: &str = "run_id, created_at, ligand_id, batch_id, preset, options, status, \
     total_tasks, done_tasks, failed_tasks";

async fn write_task<'e, E>(executor: E, task: &Task) -> StoreResult<()>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        UPDATE docking_tasks
        SET status = $2, attempts = $3, started_at = $4, finished_at = $5,
            error = $6, log_path = $7
        WHERE task_id = $1
        "#,
    )
    .bind(task.task_id)
    .bind(task.status.as_str())
    .bind(task.attempts as i32)
    .bind(task.started_at)
    .bind(task.finished_at)
    .bind(&task.error)
    .bind(&task.log_path)
    .execute(executor)
    .await?;
    Ok(())
}

/// Insert a run row and its task rows inside an open transaction
async fn insert_run(conn: &mut PgConnection, run: &Run, tasks: &[Task]) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO docking_runs
            (run_id, created_at, ligand_id, batch_id, preset, options, status,
             total_tasks, done_tasks, failed_tasks)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(run.run_id)
    .bind(run.created_at)
    .bind(run.ligand_id)
    .bind(run.batch_id)
    .bind(&run.preset)
    .bind(Json(run.options))
    .bind(run.status.as_str())
    .bind(run.total_tasks as i32)
    .bind(run.done_tasks as i32)
    .bind(run.failed_tasks as i32)
    .execute(&mut *conn)
    .await?;

    for task in tasks {
        sqlx::query(
            r#"
            INSERT INTO docking_tasks
                (task_id, run_id, protein_id, conformer_id, status, attempts,
                 created_at, started_at, finished_at, error, log_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(task.task_id)
        .bind(task.run_id)
        .bind(&task.protein_id)
        .bind(task.conformer_id)
        .bind(task.status.as_str())
        .bind(task.attempts as i32)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.finished_at)
        .bind(&task.error)
        .bind(&task.log_path)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_ligand(&self, ligand: &Ligand) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO docking_ligands (ligand_id, created_at, name, smiles, molfile, status, error)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(ligand.ligand_id)
        .bind(ligand.created_at)
        .bind(&ligand.name)
        .bind(&ligand.smiles)
        .bind(&ligand.molfile)
        .bind(ligand.status.as_str())
        .bind(&ligand.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ligand(&self, ligand_id: Uuid) -> StoreResult<Option<Ligand>> {
        sqlx::query_as::<_, LigandRow>(
            "SELECT ligand_id, created_at, name, smiles, molfile, status, error \
             FROM docking_ligands WHERE ligand_id = $1",
        )
        .bind(ligand_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Ligand::try_from)
        .transpose()
    }

    async fn set_ligand_status(
        &self,
        ligand_id: Uuid,
        status: LigandStatus,
        error: Option<String>,
    ) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE docking_ligands SET status = $2, error = $3 WHERE ligand_id = $1",
        )
        .bind(ligand_id)
        .bind(status.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("ligand", ligand_id));
        }
        Ok(())
    }

    async fn list_conformers(&self, ligand_id: Uuid) -> StoreResult<Vec<Conformer>> {
        sqlx::query_as::<_, ConformerRow>(
            "SELECT conformer_id, ligand_id, idx, status, pdb_path, pdbqt_path \
             FROM docking_conformers WHERE ligand_id = $1 ORDER BY idx",
        )
        .bind(ligand_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Conformer::try_from)
        .collect()
    }

    async fn get_conformer(&self, conformer_id: Uuid) -> StoreResult<Option<Conformer>> {
        sqlx::query_as::<_, ConformerRow>(
            "SELECT conformer_id, ligand_id, idx, status, pdb_path, pdbqt_path \
             FROM docking_conformers WHERE conformer_id = $1",
        )
        .bind(conformer_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Conformer::try_from)
        .transpose()
    }

    async fn insert_conformers(&self, conformers: &[Conformer]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for conformer in conformers {
            let result = sqlx::query(
                r#"
                INSERT INTO docking_conformers
                    (conformer_id, ligand_id, idx, status, pdb_path, pdbqt_path)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (ligand_id, idx) DO NOTHING
                "#,
            )
            .bind(conformer.conformer_id)
            .bind(conformer.ligand_id)
            .bind(conformer.idx as i32)
            .bind(conformer.status.as_str())
            .bind(&conformer.pdb_path)
            .bind(&conformer.pdbqt_path)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_conformer(&self, conformer: &Conformer) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE docking_conformers SET status = $2, pdb_path = $3, pdbqt_path = $4 \
             WHERE conformer_id = $1",
        )
        .bind(conformer.conformer_id)
        .bind(conformer.status.as_str())
        .bind(&conformer.pdb_path)
        .bind(&conformer.pdbqt_path)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("conformer", conformer.conformer_id));
        }
        Ok(())
    }

    async fn upsert_protein(&self, protein: &Protein) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO docking_proteins
                (protein_id, name, category, organism, source_id, receptor_path,
                 receptor_meta, default_box, pocket_method)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (protein_id) DO UPDATE SET
                name = EXCLUDED.name,
                category = EXCLUDED.category,
                organism = EXCLUDED.organism,
                source_id = EXCLUDED.source_id,
                receptor_path = EXCLUDED.receptor_path,
                receptor_meta = EXCLUDED.receptor_meta,
                default_box = EXCLUDED.default_box,
                pocket_method = EXCLUDED.pocket_method
            "#,
        )
        .bind(&protein.protein_id)
        .bind(&protein.name)
        .bind(&protein.category)
        .bind(&protein.organism)
        .bind(&protein.source_id)
        .bind(&protein.receptor_path)
        .bind(Json(&protein.receptor_meta))
        .bind(protein.default_box.map(Json))
        .bind(protein.pocket_method.map(|m| m.as_str()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_protein(&self, protein_id: &str) -> StoreResult<Option<Protein>> {
        sqlx::query_as::<_, ProteinRow>(
            "SELECT protein_id, name, category, organism, source_id, receptor_path, \
             receptor_meta, default_box, pocket_method FROM docking_proteins WHERE protein_id = $1",
        )
        .bind(protein_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Protein::try_from)
        .transpose()
    }

    async fn list_proteins(&self) -> StoreResult<Vec<Protein>> {
        sqlx::query_as::<_, ProteinRow>(
            "SELECT protein_id, name, category, organism, source_id, receptor_path, \
             receptor_meta, default_box, pocket_method FROM docking_proteins ORDER BY protein_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Protein::try_from)
        .collect()
    }

    async fn count_proteins(&self) -> StoreResult<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM docking_proteins")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    async fn create_batch_with_runs(
        &self,
        batch: &Batch,
        runs: &[(Run, Vec<Task>)],
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO docking_batches (batch_id, created_at, name, preset, options) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(batch.batch_id)
        .bind(batch.created_at)
        .bind(&batch.name)
        .bind(&batch.preset)
        .bind(Json(batch.options))
        .execute(&mut *tx)
        .await?;

        for (run, tasks) in runs {
            insert_run(&mut *tx, run, tasks).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_batch(&self, batch_id: Uuid) -> StoreResult<Option<Batch>> {
        Ok(sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, created_at, name, preset, options FROM docking_batches \
             WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Batch::from))
    }

    async fn list_batches(&self) -> StoreResult<Vec<Batch>> {
        Ok(sqlx::query_as::<_, BatchRow>(
            "SELECT batch_id, created_at, name, preset, options FROM docking_batches \
             ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Batch::from)
        .collect())
    }

    async fn create_run_with_tasks(&self, run: &Run, tasks: &[Task]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        insert_run(&mut *tx, run, tasks).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_run(&self, run_id: Uuid) -> StoreResult<Option<Run>> {
        sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM docking_runs WHERE run_id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Run::try_from)
        .transpose()
    }

    async fn list_runs(&self, status: Option<RunStatus>) -> StoreResult<Vec<Run>> {
        sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM docking_runs \
             WHERE $1::TEXT IS NULL OR status = $1 \
             ORDER BY created_at DESC, seq DESC"
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Run::try_from)
        .collect()
    }

    async fn list_runs_for_batch(&self, batch_id: Uuid) -> StoreResult<Vec<Run>> {
        sqlx::query_as::<_, RunRow>(&format!(
            "SELECT {RUN_COLUMNS} FROM docking_runs WHERE batch_id = $1 ORDER BY seq"
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Run::try_from)
        .collect()
    }

    async fn update_run_summary(&self, run_id: Uuid, summary: RunSummary) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE docking_runs SET status = $2, total_tasks = $3, done_tasks = $4, \
             failed_tasks = $5 WHERE run_id = $1",
        )
        .bind(run_id)
        .bind(summary.status.as_str())
        .bind(summary.total_tasks as i32)
        .bind(summary.done_tasks as i32)
        .bind(summary.failed_tasks as i32)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("run", run_id));
        }
        Ok(())
    }

    async fn get_task(&self, task_id: Uuid) -> StoreResult<Option<Task>> {
        sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM docking_tasks WHERE task_id = $1"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Task::try_from)
        .transpose()
    }

    async fn list_tasks(&self, run_id: Uuid) -> StoreResult<Vec<Task>> {
        sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM docking_tasks WHERE run_id = $1 ORDER BY seq"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Task::try_from)
        .collect()
    }

    async fn save_task_guarded(&self, task: &Task, expected: TaskState) -> StoreResult<bool> {
        self.complete_task(task, None, expected).await
    }

    async fn complete_task(
        &self,
        task: &Task,
        result: Option<&DockingResult>,
        expected: TaskState,
    ) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> = sqlx::query_scalar(
            "SELECT status FROM docking_tasks WHERE task_id = $1 FOR UPDATE",
        )
        .bind(task.task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Err(StoreError::not_found("task", task.task_id));
        };
        if parse_status::<TaskState>("task", &current)? != expected {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(result) = result {
            sqlx::query(
                r#"
                INSERT INTO docking_results
                    (result_id, task_id, created_at, best_score, pose_paths, metrics)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (task_id) DO UPDATE SET
                    result_id = EXCLUDED.result_id,
                    created_at = EXCLUDED.created_at,
                    best_score = EXCLUDED.best_score,
                    pose_paths = EXCLUDED.pose_paths,
                    metrics = EXCLUDED.metrics
                "#,
            )
            .bind(result.result_id)
            .bind(result.task_id)
            .bind(result.created_at)
            .bind(result.best_score)
            .bind(Json(&result.pose_paths))
            .bind(&result.metrics)
            .execute(&mut *tx)
            .await?;
        }

        write_task(&mut *tx, task).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get_result(&self, task_id: Uuid) -> StoreResult<Option<DockingResult>> {
        Ok(sqlx::query_as::<_, ResultRow>(
            "SELECT result_id, task_id, created_at, best_score, pose_paths, metrics \
             FROM docking_results WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?
        .map(DockingResult::from))
    }

    async fn list_results_for_run(&self, run_id: Uuid) -> StoreResult<Vec<DockingResult>> {
        Ok(sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT r.result_id, r.task_id, r.created_at, r.best_score, r.pose_paths, r.metrics
            FROM docking_results r
            JOIN docking_tasks t ON t.task_id = r.task_id
            WHERE t.run_id = $1
            ORDER BY t.seq
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(DockingResult::from)
        .collect())
    }
}
