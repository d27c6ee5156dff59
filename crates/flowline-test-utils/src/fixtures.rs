use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use flowline_core::types::{Issue, IssueComment, IssueWithComments};

/// Issue `acme/app#7` with a single comment.
pub fn sample_issue() -> IssueWithComments {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    IssueWithComments {
        issue: Issue {
            number: 7,
            title: "Crash on start".into(),
            author: "octocat".into(),
            body: "The app segfaults during init.".into(),
            state: "open".into(),
            created_at: at,
            updated_at: at,
            url: "https://github.com/acme/app/issues/7".into(),
        },
        comments: vec![IssueComment {
            author: "hubot".into(),
            body: "Reproduced on main.".into(),
            created_at: at,
        }],
    }
}

/// Write each `(name, json)` pair to `<tmp>/<name>.json`.
pub fn write_flows(flows: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, json) in flows {
        std::fs::write(dir.path().join(format!("{name}.json")), json).unwrap();
    }
    dir
}
