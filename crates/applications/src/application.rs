use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crm_auth::Principal;
use crm_core::{ApplicationId, DomainError, DomainResult, UserId, validate};

use crate::{ApplicationStatus, Comment, Course, CourseFormat, CourseType};

pub const MIN_AGE: i64 = 1;
pub const MAX_AGE: i64 = 100;

/// A lead: a prospective student and their sales-pipeline state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub age: i64,
    pub course: Course,
    pub course_type: CourseType,
    pub course_format: CourseFormat,
    pub status: Option<ApplicationStatus>,
    pub sum: Option<i64>,
    pub already_paid: Option<i64>,
    pub group: Option<String>,
    pub manager: Option<UserId>,
    pub utm: String,
    pub msg: Option<String>,
    pub comments: Vec<crm_core::CommentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lead as it arrives from the intake form (no manager, no comments).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewApplication {
    pub name: String,
    pub surname: String,
    pub email: String,
    pub phone: String,
    pub age: i64,
    pub course: Course,
    pub course_type: CourseType,
    pub course_format: CourseFormat,
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
    #[serde(default)]
    pub sum: Option<i64>,
    #[serde(default)]
    pub already_paid: Option<i64>,
    pub utm: String,
    #[serde(default)]
    pub msg: Option<String>,
}

impl Application {
    pub fn new(input: NewApplication, now: DateTime<Utc>) -> Self {
        Self {
            id: ApplicationId::new(),
            name: input.name,
            surname: input.surname,
            email: input.email,
            phone: input.phone,
            age: input.age,
            course: input.course,
            course_type: input.course_type,
            course_format: input.course_format,
            status: input.status,
            sum: input.sum,
            already_paid: input.already_paid,
            group: None,
            manager: None,
            utm: input.utm,
            msg: input.msg,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Only the assigned manager (or anyone, while unassigned) may work a lead.
    /// Admins may always.
    pub fn ensure_can_manage(&self, actor: &Principal) -> DomainResult<()> {
        match self.manager {
            Some(owner) if owner != actor.user_id && !actor.is_admin() => Err(DomainError::forbidden(
                "application is assigned to another manager",
            )),
            _ => Ok(()),
        }
    }

    /// Apply a validated partial update; the actor becomes the manager.
    pub fn apply_update(
        &mut self,
        update: ApplicationUpdate,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.ensure_can_manage(actor)?;

        let ApplicationUpdate {
            name,
            surname,
            email,
            phone,
            age,
            course,
            course_type,
            course_format,
            status,
            sum,
            already_paid,
            group,
        } = update;

        if let Some(v) = name {
            self.name = v;
        }
        if let Some(v) = surname {
            self.surname = v;
        }
        if let Some(v) = email {
            self.email = v;
        }
        if let Some(v) = phone {
            self.phone = v;
        }
        if let Some(v) = age {
            self.age = v;
        }
        if let Some(v) = course {
            self.course = v;
        }
        if let Some(v) = course_type {
            self.course_type = v;
        }
        if let Some(v) = course_format {
            self.course_format = v;
        }
        if let Some(v) = status {
            self.status = Some(v);
        }
        if let Some(v) = sum {
            self.sum = Some(v);
        }
        if let Some(v) = already_paid {
            self.already_paid = Some(v);
        }
        if let Some(v) = group {
            self.group = v;
        }

        self.manager = Some(actor.user_id);
        self.updated_at = now;
        Ok(())
    }

    /// Attach a comment: the author takes the lead and it moves to "In work".
    pub fn add_comment(&mut self, comment: &Comment, actor: &Principal, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_can_manage(actor)?;
        if comment.application_id != self.id {
            return Err(DomainError::invariant("comment belongs to another application"));
        }
        self.comments.push(comment.id);
        self.manager = Some(actor.user_id);
        self.status = Some(ApplicationStatus::InWork);
        self.updated_at = now;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Partial update
// ─────────────────────────────────────────────────────────────────────────────

/// Raw PATCH body. Absent and `null` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationPatch {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<i64>,
    pub course: Option<String>,
    pub course_type: Option<String>,
    pub course_format: Option<String>,
    pub status: Option<String>,
    pub sum: Option<i64>,
    pub already_paid: Option<i64>,
    pub group: Option<String>,
}

/// Validated partial update.
///
/// `group: Some(None)` clears the group (sent as an empty string).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<i64>,
    pub course: Option<Course>,
    pub course_type: Option<CourseType>,
    pub course_format: Option<CourseFormat>,
    pub status: Option<ApplicationStatus>,
    pub sum: Option<i64>,
    pub already_paid: Option<i64>,
    pub group: Option<Option<String>>,
}

impl ApplicationPatch {
    pub fn validate(self) -> DomainResult<ApplicationUpdate> {
        let age = match self.age {
            Some(a) if !(MIN_AGE..=MAX_AGE).contains(&a) => {
                return Err(DomainError::validation(format!(
                    "age must be between {MIN_AGE} and {MAX_AGE}"
                )));
            }
            other => other,
        };

        Ok(ApplicationUpdate {
            name: self.name.map(|s| s.trim().to_string()),
            surname: self.surname.map(|s| s.trim().to_string()),
            email: self.email.as_deref().map(validate::normalize_email).transpose()?,
            phone: self.phone.as_deref().map(validate::phone).transpose()?,
            age,
            course: self.course.as_deref().map(str::parse).transpose()?,
            course_type: self.course_type.as_deref().map(str::parse).transpose()?,
            course_format: self.course_format.as_deref().map(str::parse).transpose()?,
            status: self.status.as_deref().map(str::parse).transpose()?,
            sum: non_negative("sum", self.sum)?,
            already_paid: non_negative("already_paid", self.already_paid)?,
            group: self.group.map(|g| {
                let g = g.trim();
                if g.is_empty() { None } else { Some(g.to_string()) }
            }),
        })
    }
}

fn non_negative(field: &str, value: Option<i64>) -> DomainResult<Option<i64>> {
    match value {
        Some(v) if v < 0 => Err(DomainError::validation(format!("{field} must be >= 0"))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_auth::Role;

    fn lead() -> Application {
        Application::new(
            NewApplication {
                name: "Taras".into(),
                surname: "Bondar".into(),
                email: "taras@mail.io".into(),
                phone: "380501112233".into(),
                age: 24,
                course: Course::Fs,
                course_type: CourseType::Pro,
                course_format: CourseFormat::Online,
                status: None,
                sum: None,
                already_paid: None,
                utm: "ig".into(),
                msg: None,
            },
            Utc::now(),
        )
    }

    fn manager() -> Principal {
        Principal::new(UserId::new(), Role::Manager)
    }

    #[test]
    fn patch_validation_rejects_bad_fields() {
        let cases = [
            ApplicationPatch { age: Some(0), ..Default::default() },
            ApplicationPatch { age: Some(101), ..Default::default() },
            ApplicationPatch { phone: Some("0501112233".into()), ..Default::default() },
            ApplicationPatch { email: Some("nope".into()), ..Default::default() },
            ApplicationPatch { status: Some("Done".into()), ..Default::default() },
            ApplicationPatch { sum: Some(-1), ..Default::default() },
        ];
        for patch in cases {
            assert!(matches!(patch.validate(), Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn empty_group_clears_it() {
        let update = ApplicationPatch { group: Some("  ".into()), ..Default::default() }
            .validate()
            .unwrap();
        assert_eq!(update.group, Some(None));

        let mut app = lead();
        app.group = Some("FS-2024".into());
        app.apply_update(update, &manager(), Utc::now()).unwrap();
        assert_eq!(app.group, None);
    }

    #[test]
    fn update_assigns_actor_as_manager() {
        let mut app = lead();
        let actor = manager();
        let update = ApplicationPatch {
            status: Some("Aggre".into()),
            sum: Some(30_000),
            ..Default::default()
        }
        .validate()
        .unwrap();

        app.apply_update(update, &actor, Utc::now()).unwrap();
        assert_eq!(app.manager, Some(actor.user_id));
        assert_eq!(app.status, Some(ApplicationStatus::Agree));
        assert_eq!(app.sum, Some(30_000));
        assert_eq!(app.name, "Taras");
    }

    #[test]
    fn other_managers_cannot_touch_an_assigned_lead() {
        let mut app = lead();
        let owner = manager();
        app.apply_update(ApplicationUpdate::default(), &owner, Utc::now()).unwrap();

        let intruder = manager();
        let err = app.apply_update(ApplicationUpdate::default(), &intruder, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let admin = Principal::new(UserId::new(), Role::Admin);
        assert!(app.apply_update(ApplicationUpdate::default(), &admin, Utc::now()).is_ok());
    }

    #[test]
    fn comment_moves_lead_in_work() {
        let mut app = lead();
        let actor = manager();
        let comment = Comment::new(app.id, "called, interested".into(), actor.user_id, Utc::now());

        app.add_comment(&comment, &actor, Utc::now()).unwrap();
        assert_eq!(app.comments, vec![comment.id]);
        assert_eq!(app.status, Some(ApplicationStatus::InWork));
        assert_eq!(app.manager, Some(actor.user_id));
    }
}
