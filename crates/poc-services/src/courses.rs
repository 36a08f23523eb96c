//! Course catalog
//!
//! The catalog holds the descriptive side of a course (title, modules,
//! assignments). The escrow side (stake amount, active flag) lives on the
//! `StakingManager`; registering or updating a course writes the ledger
//! first and the catalog second, so the ledger's own guards decide whether
//! the change is allowed.

use crate::error::{Result, ServiceError};
use poc_core::{serde_amount, Address, CourseId, SharedClock, Wei};
use poc_economics::constants::{DEFAULT_COURSE_STAKE, DEFAULT_TOTAL_MODULES};
use poc_economics::{StakingError, StakingManager};
use poc_storage::{collections, Collection, DocumentStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseModule {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub lessons: u32,
    #[serde(default)]
    pub duration: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseAssignment {
    pub id: String,
    pub heading: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow_repo_submission: bool,
}

/// Catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseInfo {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "serde_amount")]
    pub stake_amount: Wei,
    pub total_modules: u32,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
    #[serde(default)]
    pub allow_repo_submission: bool,
    #[serde(default)]
    pub assignments: Vec<CourseAssignment>,
    pub active: bool,
    pub published: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Assignment as submitted with a new course; the id is generated
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub heading: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub allow_repo_submission: bool,
}

/// Input for `CourseService::register`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCourse {
    pub id: CourseId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to 0.0001 ETH
    #[serde(default, with = "serde_amount::option")]
    pub stake_amount: Option<Wei>,
    /// Defaults to the module list length, else 4
    #[serde(default)]
    pub total_modules: Option<u32>,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
    #[serde(default)]
    pub allow_repo_submission: bool,
    #[serde(default)]
    pub assignments: Vec<NewAssignment>,
    #[serde(default = "default_true")]
    pub published: bool,
}

fn default_true() -> bool {
    true
}

impl NewCourse {
    pub fn new(id: CourseId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            stake_amount: None,
            total_modules: None,
            modules: Vec::new(),
            allow_repo_submission: false,
            assignments: Vec::new(),
            published: true,
        }
    }
}

/// Partial update for `CourseService::update`
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "serde_amount::option")]
    pub stake_amount: Option<Wei>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub published: Option<bool>,
    #[serde(default)]
    pub modules: Option<Vec<CourseModule>>,
}

/// Course catalog service
#[derive(Clone)]
pub struct CourseService {
    catalog: Collection<CourseInfo>,
    staking: Arc<StakingManager>,
    clock: SharedClock,
}

impl CourseService {
    pub fn new(store: Arc<dyn DocumentStore>, staking: Arc<StakingManager>, clock: SharedClock) -> Self {
        Self {
            catalog: Collection::new(store, collections::COURSES),
            staking,
            clock,
        }
    }

    pub fn staking(&self) -> &Arc<StakingManager> {
        &self.staking
    }

    /// List a course on the ledger and in the catalog
    pub async fn register(&self, caller: Address, course: NewCourse) -> Result<CourseInfo> {
        let title = course.title.trim();
        if title.is_empty() {
            return Err(ServiceError::validation("Course title is required"));
        }
        let total_modules = match (course.total_modules, course.modules.len()) {
            (Some(n), _) => n,
            (None, 0) => DEFAULT_TOTAL_MODULES,
            (None, len) => len as u32,
        };
        if total_modules == 0 {
            return Err(ServiceError::validation("Course must have at least one module"));
        }
        let stake_amount = course.stake_amount.unwrap_or(DEFAULT_COURSE_STAKE);

        self.staking.add_course(caller, course.id, stake_amount)?;

        let now = self.clock.now();
        let info = CourseInfo {
            id: course.id,
            title: title.to_string(),
            description: course.description,
            stake_amount,
            total_modules,
            modules: course.modules,
            allow_repo_submission: course.allow_repo_submission,
            assignments: course
                .assignments
                .into_iter()
                .map(|a| CourseAssignment {
                    id: uuid::Uuid::new_v4().to_string(),
                    heading: a.heading,
                    description: a.description,
                    allow_repo_submission: a.allow_repo_submission,
                })
                .collect(),
            active: true,
            published: course.published,
            created_at: now,
            updated_at: now,
        };

        self.catalog.put(&course.id.to_string(), &info).await?;
        tracing::info!(course_id = info.id, title = %info.title, stake = stake_amount, "Course registered");
        Ok(info)
    }

    /// Register every course not yet on the ledger, returning how many were added
    pub async fn seed(&self, owner: Address, courses: Vec<NewCourse>) -> Result<usize> {
        let mut added = 0;
        for course in courses {
            let id = course.id;
            match self.register(owner, course).await {
                Ok(_) => added += 1,
                Err(ServiceError::Staking(StakingError::CourseAlreadyExists)) => {
                    tracing::debug!(course_id = id, "Seed course already listed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// Apply a partial update; stake and active flag go through the ledger
    pub async fn update(&self, caller: Address, course_id: CourseId, update: CourseUpdate) -> Result<CourseInfo> {
        let current = self
            .get(course_id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Course {course_id} not found")))?;

        if update.stake_amount.is_some() || update.active.is_some() {
            let config = self.staking.course(course_id).ok_or(StakingError::CourseNotFound)?;
            self.staking.update_course(
                caller,
                course_id,
                update.stake_amount.unwrap_or(config.stake_amount),
                update.active.unwrap_or(config.active),
            )?;
        } else if caller != self.staking.owner() {
            return Err(StakingError::OwnableUnauthorizedAccount(caller).into());
        }

        let now = self.clock.now();
        let updated = self
            .catalog
            .modify::<_, ServiceError>(&course_id.to_string(), |stored| {
                let mut info = stored.unwrap_or_else(|| current.clone());
                if let Some(title) = &update.title {
                    info.title = title.clone();
                }
                if let Some(description) = &update.description {
                    info.description = description.clone();
                }
                if let Some(amount) = update.stake_amount {
                    info.stake_amount = amount;
                }
                if let Some(active) = update.active {
                    info.active = active;
                }
                if let Some(published) = update.published {
                    info.published = published;
                }
                if let Some(modules) = &update.modules {
                    if !modules.is_empty() {
                        info.total_modules = modules.len() as u32;
                    }
                    info.modules = modules.clone();
                }
                info.updated_at = now;
                Ok(info)
            })
            .await?;

        tracing::info!(course_id, "Course updated");
        Ok(updated.value)
    }

    pub async fn get(&self, course_id: CourseId) -> Result<Option<CourseInfo>> {
        Ok(self.catalog.get(&course_id.to_string()).await?.map(|v| v.value))
    }

    /// Catalog sorted by id, optionally only active published courses
    pub async fn list(&self, only_active: bool) -> Result<Vec<CourseInfo>> {
        let mut courses = self
            .catalog
            .find(|c: &CourseInfo| !only_active || (c.active && c.published))
            .await?;
        courses.sort_by_key(|c| c.id);
        Ok(courses)
    }

    /// Module count from the catalog, if the course is listed
    pub async fn total_modules(&self, course_id: CourseId) -> Result<Option<u32>> {
        Ok(self.get(course_id).await?.map(|c| c.total_modules))
    }
}
