//! Splits the rows still to import into request-sized windows and renders them as the
//! URL stack a polling client walks through.

use crate::error::{ImportError, ImportResult};
use crate::job::ImportJob;
use serde::Serialize;
use std::num::NonZeroUsize;

/// One `(offset, limit)` slice of data rows. `req_num` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub offset: usize,
    pub limit: usize,
    pub req_num: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPlan {
    pub total_rows: usize,
    /// Rows covered by `windows`.
    pub remaining: usize,
    pub windows: Vec<Window>,
    /// Offset to resume from once every window has run.
    pub next_offset: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkPlanner {
    rows_per_request: NonZeroUsize,
}

impl ChunkPlanner {
    pub fn new(rows_per_request: usize) -> ImportResult<Self> {
        NonZeroUsize::new(rows_per_request)
            .map(|rows_per_request| Self { rows_per_request })
            .ok_or_else(|| ImportError::Config("rows per request must be positive".into()))
    }

    pub fn rows_per_request(&self) -> usize {
        self.rows_per_request.get()
    }

    /// Windows covering `[offset, offset + remaining)` where `remaining` is the rows left
    /// after `offset`, capped by `limit` when it is non-zero.
    pub fn plan(&self, total_rows: usize, offset: usize, limit: usize) -> ChunkPlan {
        let mut remaining = total_rows.saturating_sub(offset);
        if limit > 0 {
            remaining = remaining.min(limit);
        }
        let per_request = self.rows_per_request.get();
        let windows = (0..remaining.div_ceil(per_request))
            .map(|i| Window {
                offset: offset + i * per_request,
                limit: per_request.min(remaining - i * per_request),
                req_num: i + 1,
            })
            .collect();
        ChunkPlan {
            total_rows,
            remaining,
            windows,
            next_offset: offset + remaining,
        }
    }

    /// Builds the payload handed to a polling client for `job`.
    pub fn mount(
        &self,
        job: &ImportJob,
        total_rows: usize,
        task_id: &str,
        token: &str,
        template: &UrlTemplate,
    ) -> MountResponse {
        let plan = self.plan(total_rows, job.offset, job.limit);
        let url_stack = plan
            .windows
            .iter()
            .map(|window| template.render(&job.id, task_id, token, window))
            .collect();
        MountResponse {
            data: MountData {
                model: JobModel {
                    job: job.clone(),
                    count: total_rows,
                },
                url_stack,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MountResponse {
    pub data: MountData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MountData {
    pub model: JobModel,
    pub url_stack: Vec<String>,
}

/// The job as stored, plus the file's data row count.
#[derive(Debug, Clone, Serialize)]
pub struct JobModel {
    #[serde(flatten)]
    pub job: ImportJob,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    Id,
    TaskId,
    Offset,
    Limit,
    ReqNum,
    Token,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Value(Placeholder),
}

/// Chunk URL format with `{id}`, `{taskId}`, `{offset}`, `{limit}`, `{reqNum}` and
/// `{token}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

pub const DEFAULT_URL_TEMPLATE: &str = concat!(
    "contao?do=import_from_csv&key=importAction",
    "&id={id}&taskId={taskId}&offset={offset}&limit={limit}&req_num={reqNum}&token={token}"
);

impl Default for UrlTemplate {
    fn default() -> Self {
        Self::parse(DEFAULT_URL_TEMPLATE).unwrap_or(Self {
            segments: Vec::new(),
        })
    }
}

impl UrlTemplate {
    pub fn parse(template: &str) -> ImportResult<Self> {
        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Text(rest[..open].to_string()));
            }
            let close = rest[open..].find('}').ok_or_else(|| {
                ImportError::Config(format!("unclosed placeholder in url template '{template}'"))
            })?;
            let name = &rest[open + 1..open + close];
            let placeholder = match name {
                "id" => Placeholder::Id,
                "taskId" => Placeholder::TaskId,
                "offset" => Placeholder::Offset,
                "limit" => Placeholder::Limit,
                "reqNum" => Placeholder::ReqNum,
                "token" => Placeholder::Token,
                other => {
                    return Err(ImportError::Config(format!(
                        "unknown placeholder '{{{other}}}' in url template"
                    )))
                }
            };
            segments.push(Segment::Value(placeholder));
            rest = &rest[open + close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, id: &str, task_id: &str, token: &str, window: &Window) -> String {
        let mut url = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => url.push_str(text),
                Segment::Value(Placeholder::Id) => url.push_str(id),
                Segment::Value(Placeholder::TaskId) => url.push_str(task_id),
                Segment::Value(Placeholder::Token) => url.push_str(token),
                Segment::Value(Placeholder::Offset) => url.push_str(&window.offset.to_string()),
                Segment::Value(Placeholder::Limit) => url.push_str(&window.limit.to_string()),
                Segment::Value(Placeholder::ReqNum) => url.push_str(&window.req_num.to_string()),
            }
        }
        url
    }
}
