//! List query for applications: filters, sort and page.

use core::cmp::Ordering;
use core::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crm_core::{DomainError, DomainResult, PageRequest, UserId};

use crate::{Application, ApplicationStatus, Course, CourseFormat, CourseType};

pub const DEFAULT_PAGE_SIZE: u32 = 25;

/// Raw query-string parameters of `GET /applications`.
///
/// Blank values are treated as absent, since list UIs send every filter field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationQueryParams {
    pub page: Option<u32>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u32>,
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<String>,
    pub course: Option<String>,
    pub course_type: Option<String>,
    pub course_format: Option<String>,
    pub status: Option<String>,
    pub group: Option<String>,
    pub manager: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    Surname,
    Email,
    Phone,
    Age,
    Course,
    CourseType,
    CourseFormat,
    Status,
    Group,
    Sum,
    AlreadyPaid,
    Manager,
    CreatedAt,
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "name" => SortField::Name,
            "surname" => SortField::Surname,
            "email" => SortField::Email,
            "phone" => SortField::Phone,
            "age" => SortField::Age,
            "course" => SortField::Course,
            "course_type" => SortField::CourseType,
            "course_format" => SortField::CourseFormat,
            "status" => SortField::Status,
            "group" => SortField::Group,
            "sum" => SortField::Sum,
            "already_paid" => SortField::AlreadyPaid,
            "manager" => SortField::Manager,
            "created_at" => SortField::CreatedAt,
            other => return Err(DomainError::validation(format!("cannot sort by '{other}'"))),
        })
    }
}

impl SortField {
    /// Compare two applications on this field, ties broken by id so paging is stable.
    pub fn compare(&self, a: &Application, b: &Application) -> Ordering {
        let by_field = match self {
            SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortField::Surname => a.surname.to_lowercase().cmp(&b.surname.to_lowercase()),
            SortField::Email => a.email.cmp(&b.email),
            SortField::Phone => a.phone.cmp(&b.phone),
            SortField::Age => a.age.cmp(&b.age),
            SortField::Course => a.course.as_str().cmp(b.course.as_str()),
            SortField::CourseType => a.course_type.as_str().cmp(b.course_type.as_str()),
            SortField::CourseFormat => a.course_format.as_str().cmp(b.course_format.as_str()),
            SortField::Status => a.status.map(|s| s.as_str()).cmp(&b.status.map(|s| s.as_str())),
            SortField::Group => a.group.cmp(&b.group),
            SortField::Sum => a.sum.cmp(&b.sum),
            SortField::AlreadyPaid => a.already_paid.cmp(&b.already_paid),
            SortField::Manager => a.manager.cmp(&b.manager),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        by_field.then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(DomainError::validation(format!("order must be asc or desc, got '{other}'"))),
        }
    }
}

/// Row filter. Text fields hold lowercased needles for substring matching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationFilter {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub age: Option<i64>,
    pub course: Option<Course>,
    pub course_type: Option<CourseType>,
    pub course_format: Option<CourseFormat>,
    pub status: Option<ApplicationStatus>,
    pub group: Option<String>,
    /// Manager first-name needle, resolved into `managers` before querying.
    pub manager_name: Option<String>,
    /// Allowed managers; `Some(vec![])` matches nothing.
    pub managers: Option<Vec<UserId>>,
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub created_before: Option<DateTime<Utc>>,
}

impl ApplicationFilter {
    /// Narrow the allowed managers to `ids` (intersecting any previous restriction).
    pub fn restrict_managers(&mut self, ids: Vec<UserId>) {
        self.managers = Some(match self.managers.take() {
            Some(existing) => existing.into_iter().filter(|id| ids.contains(id)).collect(),
            None => ids,
        });
    }

    pub fn matches(&self, app: &Application) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_deref()
                .is_none_or(|n| haystack.to_lowercase().contains(n))
        }
        fn equals<T: PartialEq>(value: &T, wanted: &Option<T>) -> bool {
            wanted.as_ref().is_none_or(|w| w == value)
        }

        contains(&app.name, &self.name)
            && contains(&app.surname, &self.surname)
            && contains(&app.email, &self.email)
            && contains(&app.phone, &self.phone)
            && equals(&app.age, &self.age)
            && equals(&app.course, &self.course)
            && equals(&app.course_type, &self.course_type)
            && equals(&app.course_format, &self.course_format)
            && self.status.is_none_or(|s| app.status == Some(s))
            && self.group.as_ref().is_none_or(|g| app.group.as_ref() == Some(g))
            && self
                .managers
                .as_ref()
                .is_none_or(|ids| app.manager.is_some_and(|m| ids.contains(&m)))
            && self.created_from.is_none_or(|from| app.created_at >= from)
            && self.created_before.is_none_or(|before| app.created_at < before)
    }
}

/// Fully validated list query.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationQuery {
    pub page: PageRequest,
    pub filter: ApplicationFilter,
    pub sort: SortField,
    pub order: SortOrder,
}

impl ApplicationQuery {
    /// Ordering of two applications under this query's sort and order.
    pub fn compare(&self, a: &Application, b: &Application) -> Ordering {
        let ord = self.sort.compare(a, b);
        match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_present<T: FromStr<Err = DomainError>>(value: Option<String>) -> DomainResult<Option<T>> {
    present(value).as_deref().map(str::parse).transpose()
}

fn parse_date(field: &str, value: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| DomainError::validation(format!("{field} must be a date in YYYY-MM-DD form")))
}

impl ApplicationQueryParams {
    pub fn parse(self) -> DomainResult<ApplicationQuery> {
        let page = PageRequest::new(self.page, self.page_size, DEFAULT_PAGE_SIZE)?;

        let age = present(self.age)
            .map(|a| {
                a.parse::<i64>()
                    .map_err(|_| DomainError::validation("age filter must be a whole number"))
            })
            .transpose()?;

        let created_from = present(self.start_date)
            .map(|d| parse_date("startDate", &d))
            .transpose()?
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let created_before = present(self.end_date)
            .map(|d| parse_date("endDate", &d))
            .transpose()?
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());

        let lower = |v: Option<String>| present(v).map(|s| s.to_lowercase());

        let filter = ApplicationFilter {
            name: lower(self.name),
            surname: lower(self.surname),
            email: lower(self.email),
            phone: lower(self.phone),
            age,
            course: parse_present(self.course)?,
            course_type: parse_present(self.course_type)?,
            course_format: parse_present(self.course_format)?,
            status: parse_present(self.status)?,
            group: present(self.group),
            manager_name: lower(self.manager),
            managers: None,
            created_from,
            created_before,
        };

        Ok(ApplicationQuery {
            page,
            filter,
            sort: parse_present(self.sort)?.unwrap_or(SortField::CreatedAt),
            order: parse_present(self.order)?.unwrap_or(SortOrder::Desc),
        })
    }
}
