use serde::Serialize;

use crate::limits::*;
use crate::model::Appointment;
use crate::validator::FieldErrors;

pub const SORT_SAFELIST: [&str; 4] = ["id", "scheduled_at", "-id", "-scheduled_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Id,
    ScheduledAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub key: SortKey,
    pub descending: bool,
}

impl Sort {
    fn parse(s: &str) -> Option<Self> {
        let (descending, column) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let key = match column {
            "id" => SortKey::Id,
            "scheduled_at" => SortKey::ScheduledAt,
            _ => return None,
        };
        Some(Self { key, descending })
    }

    /// Ties are broken by id ascending regardless of direction.
    pub fn apply(self, appointments: &mut [Appointment]) {
        appointments.sort_by(|a, b| {
            let primary = match self.key {
                SortKey::Id => a.id.cmp(&b.id),
                SortKey::ScheduledAt => a.scheduled_at.cmp(&b.scheduled_at),
            };
            let primary = if self.descending { primary.reverse() } else { primary };
            primary.then_with(|| a.id.cmp(&b.id))
        });
    }
}

/// Pagination and sorting for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: u32,
    pub page_size: u32,
    pub sort: String,
}

impl Filters {
    /// Agents see their calendar soonest-first.
    pub fn for_agent() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "scheduled_at".into(),
        }
    }

    /// Users see their latest requests first.
    pub fn for_user() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "-scheduled_at".into(),
        }
    }

    pub fn validate(&self) -> Result<Sort, FieldErrors> {
        let mut v = FieldErrors::new();
        v.check(self.page > 0, "page", "must be greater than zero");
        v.check(self.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(self.page_size > 0, "page_size", "must be greater than zero");
        v.check(self.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
        let sort = SORT_SAFELIST
            .contains(&self.sort.as_str())
            .then(|| Sort::parse(&self.sort))
            .flatten();
        if sort.is_none() {
            v.add("sort", "invalid sort value");
        }
        v.into_result()?;
        sort.ok_or_else(|| FieldErrors::single("sort", "invalid sort value"))
    }

    fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.page_size as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u32,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl Metadata {
    /// Empty metadata when there is nothing to page through.
    pub fn calculate(total_records: usize, page: u32, page_size: u32) -> Self {
        if total_records == 0 || page_size == 0 {
            return Self::default();
        }
        let total = total_records as u32;
        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: total.div_ceil(page_size),
            total_records: total,
        }
    }
}

/// Sort, then cut out the requested page. The caller has validated `filters`.
pub fn paginate(
    mut appointments: Vec<Appointment>,
    sort: Sort,
    filters: &Filters,
) -> (Vec<Appointment>, Metadata) {
    let total = appointments.len();
    sort.apply(&mut appointments);
    let page = appointments
        .into_iter()
        .skip(filters.offset())
        .take(filters.page_size as usize)
        .collect();
    (page, Metadata::calculate(total, filters.page, filters.page_size))
}
