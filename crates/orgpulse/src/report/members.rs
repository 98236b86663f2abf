//! Membership roster dataset, one row per user-group pair.

use tracing::{debug, warn};

use orgpulse_core::sanitize::{
    FIELD_LENGTH_DEFAULT, date_from_millis, days_since_date, truncate,
};
use orgpulse_core::{Column, Dataset, Value};

use crate::portal::MetadataSource;
use crate::report::ReportContext;

fn columns() -> Vec<Column> {
    vec![
        Column::text("user_name"),
        Column::text("user_email"),
        Column::date("user_last_login"),
        Column::text("user_org_id"),
        Column::date("user_created"),
        Column::text("group_id"),
        Column::text("user_categories"),
        Column::text("user_membership_type"),
        Column::integer("days_since_login"),
        Column::boolean("is_active"),
    ]
}

/// One row per (user, group) membership.
///
/// A member counts as Internal only when their directory org id matches the
/// session's organization; members missing from the directory are External,
/// since the directory lists the whole home organization.
pub async fn build_members(source: &dyn MetadataSource, ctx: &ReportContext) -> Dataset {
    let mut dataset = Dataset::new(columns());
    let today = ctx.now.date_naive();

    for group in &ctx.groups {
        let members = match source.group_members(&group.id).await {
            Ok(members) => members.all(),
            Err(error) => {
                warn!(group = %group.id, %error, "could not fetch group members");
                continue;
            }
        };

        for username in &members {
            let user = ctx.directory.get(username);
            if user.is_none() {
                debug!(group = %group.id, %username, "member not in user directory, treating as external");
            }
            let last_login = date_from_millis(user.and_then(|u| u.last_login));
            let days_since_login = last_login.map(|date| days_since_date(date, today));
            let internal = user
                .and_then(|u| u.org_id.as_deref())
                .map(|org| !org.is_empty() && !ctx.session.org_id.is_empty() && org == ctx.session.org_id)
                .unwrap_or(false);
            let categories = user.map(|u| u.categories.join(", ")).unwrap_or_default();

            dataset.push_row(vec![
                Value::Text(ctx.directory.full_name(username)),
                Value::Text(
                    user.and_then(|u| u.email.clone()).unwrap_or_default(),
                ),
                Value::opt_date(last_login),
                Value::Text(
                    user.and_then(|u| u.org_id.clone()).unwrap_or_default(),
                ),
                Value::opt_date(date_from_millis(user.and_then(|u| u.created))),
                Value::Text(group.id.clone()),
                Value::Text(truncate(Some(&categories), FIELD_LENGTH_DEFAULT, true)),
                Value::Text(if internal { "Internal" } else { "External" }.to_string()),
                Value::opt_int(days_since_login),
                Value::Bool(
                    days_since_login
                        .map(|days| days <= ctx.recent_days_threshold)
                        .unwrap_or(false),
                ),
            ]);
        }
    }

    dataset
}
