//! Council members from the web interface; bodies, persons and office
//! records from the REST interface.

use chrono::NaiveDateTime;
use scraper::Selector;
use std::collections::VecDeque;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::context::CrawlContext;
use crate::error::{Result, ScrapeError};
use crate::extract::detail::page_details;
use crate::extract::table::extract_table;
use crate::paging::{since_filter, HtmlPager, RestPager};
use crate::session::PostbackSession;
use crate::traits::transport::Form;
use crate::types::api::{ApiBody, ApiOfficeRecord, ApiPerson};
use crate::types::page::{DetailRecord, Page, TableRow};
use crate::types::records::{Membership, Organization, Person, SourceLink};

pub const PEOPLE_GRID: &str = "ctl00_ContentPlaceHolder1_gridPeople_ctl00";
pub const PERSON_DETAIL_DIV: &str = "ctl00_ContentPlaceHolder1_pageDetails";
pub const COMMITTEE_GRID: &str = "ctl00_ContentPlaceHolder1_gridDepartments_ctl00";

static PHOTO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("img[id='ctl00_ContentPlaceHolder1_imgPhoto']").expect("static selector")
});

/// One row of the member grid, plus its detail page when followed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CouncilMember {
    pub row: TableRow,
    pub details: Option<DetailRecord>,
    pub photo: Option<String>,
    pub committees: Vec<TableRow>,
}

impl CouncilMember {
    /// Fill details, photo and committees from a member detail page.
    fn merge_detail(&mut self, page: &Page, ctx: &CrawlContext) -> Result<()> {
        match page_details(page, PERSON_DETAIL_DIV, ctx.hooks.field_extractor()) {
            Ok(details) => self.details = Some(details),
            Err(ScrapeError::MissingStructure { .. }) => {
                warn!(url = %page.url, "Member page has no detail fields");
            }
            Err(e) => return Err(e),
        }

        self.photo = photo_url(page);

        match extract_table(page, COMMITTEE_GRID, &ctx.config.no_records_marker) {
            Ok(grid) => self.committees = grid.rows,
            Err(ScrapeError::MissingStructure { .. }) => {
                debug!(url = %page.url, "Member page has no committee grid");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Pages of the member grid, optionally following each member's link.
pub struct CouncilMembers<'c> {
    ctx: &'c CrawlContext,
    session: PostbackSession<'c>,
    pager: HtmlPager,
    rows: VecDeque<TableRow>,
    follow_links: bool,
}

impl<'c> CouncilMembers<'c> {
    pub fn new(ctx: &'c CrawlContext) -> Self {
        Self {
            ctx,
            session: ctx.session(),
            pager: HtmlPager::get(&ctx.config.people_url()).with_submit_button(None),
            rows: VecDeque::new(),
            follow_links: true,
        }
    }

    /// Submit `payload` (e.g. a different list selection) for the first page.
    pub fn with_payload(mut self, payload: Form) -> Self {
        self.pager = HtmlPager::submit(&self.ctx.config.people_url(), payload).with_submit_button(None);
        self
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub async fn next(&mut self) -> Result<Option<CouncilMember>> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                return self.member(row).await.map(Some);
            }
            let marker = &self.ctx.config.no_records_marker;
            let Some(grid) = self.pager.next_grid(&mut self.session, PEOPLE_GRID, marker).await? else {
                return Ok(None);
            };
            self.rows.extend(grid.rows);
        }
    }

    async fn member(&self, row: TableRow) -> Result<CouncilMember> {
        let detail_url = self
            .ctx
            .field(&row, "person.name")
            .and_then(|v| v.url())
            .map(str::to_string);
        let mut member = CouncilMember {
            row,
            ..Default::default()
        };

        if let (true, Some(url)) = (self.follow_links, detail_url) {
            // Separate session: the detail GET must not replace the grid's tokens.
            let page = self.ctx.session().get(&url).await?;
            member.merge_detail(&page, self.ctx)?;
        }
        Ok(member)
    }
}

/// REST bodies, persons and office records.
pub struct ApiPeople<'c> {
    ctx: &'c CrawlContext,
}

impl<'c> ApiPeople<'c> {
    pub fn new(ctx: &'c CrawlContext) -> Self {
        Self { ctx }
    }

    pub fn bodies(&self) -> RestPager<'c, ApiBody> {
        RestPager::new(&self.ctx.fetcher, self.ctx.config.api_url("bodies"), "BodyId")
    }

    /// Persons changed since `since`.
    pub fn persons(&self, since: Option<NaiveDateTime>) -> RestPager<'c, ApiPerson> {
        RestPager::new(&self.ctx.fetcher, self.ctx.config.api_url("persons"), "PersonId")
            .with_filter(since.map(|since| since_filter(&["PersonLastModifiedUtc"], since)))
    }

    /// Every office record held on `body_id`.
    pub async fn office_records(&self, body_id: i64) -> Result<Vec<ApiOfficeRecord>> {
        RestPager::new(&self.ctx.fetcher, self.ctx.config.api_url("officerecords"), "OfficeRecordId")
            .with_filter(Some(format!("OfficeRecordBodyId eq {}", body_id)))
            .collect_all()
            .await
    }

    /// Output organization, unless the jurisdiction drops this body.
    pub fn organization(&self, body: &ApiBody) -> Option<Organization> {
        let name = body.body_name.trim();
        if self.ctx.hooks.drop_organization(name) {
            debug!(body_id = body.body_id, name, "Dropping organization");
            return None;
        }
        Some(Organization {
            id: body.body_id,
            name: name.to_string(),
            classification: body.body_type_name.clone(),
            sources: vec![SourceLink::new(self.ctx.config.api_url(&format!("bodies/{}", body.body_id)))],
        })
    }

    /// Output person with a membership per office record.
    pub fn person(&self, person: &ApiPerson, records: &[ApiOfficeRecord]) -> Person {
        let memberships = records
            .iter()
            .filter(|r| r.office_record_person_id == Some(person.person_id))
            .filter_map(|r| {
                let organization = r.office_record_body_name.as_deref()?.trim().to_string();
                if self.ctx.hooks.drop_organization(&organization) {
                    return None;
                }
                Some(Membership {
                    organization,
                    role: r.office_record_title.clone().or_else(|| r.office_record_member_type.clone()),
                    start_date: r.office_record_start_date.as_deref().map(date_part),
                    end_date: r.office_record_end_date.as_deref().map(date_part),
                })
            })
            .collect();

        let non_empty = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
        Person {
            name: person.person_full_name.trim().to_string(),
            id: Some(person.person_id),
            email: non_empty(&person.person_email),
            website: non_empty(&person.person_www),
            image: None,
            memberships,
            sources: vec![SourceLink::new(
                self.ctx.config.api_url(&format!("persons/{}", person.person_id)),
            )],
        }
    }
}

fn photo_url(page: &Page) -> Option<String> {
    let document = page.document();
    let src = document
        .select(&PHOTO)
        .next()
        .and_then(|img| img.value().attr("src"))?
        .to_string();
    page.resolve(&src)
}

fn date_part(stamp: &str) -> String {
    stamp.get(..10).unwrap_or(stamp).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Fetcher, RetryPolicy};
    use crate::testing::{fixtures, MockReply, MockTransport};
    use crate::traits::hooks::JurisdictionHooks;
    use crate::types::config::JurisdictionConfig;
    use crate::types::page::FieldMap;
    use std::sync::Arc;

    const PEOPLE: &str = "https://metro.legistar.com/People.aspx";

    fn context(mock: &MockTransport) -> CrawlContext {
        let config = JurisdictionConfig::new(
            "metro",
            "https://metro.legistar.com",
            "https://webapi.legistar.com/v1/metro",
            "America/Los_Angeles",
        );
        let fetcher = Fetcher::new(Arc::new(mock.clone())).with_retry(RetryPolicy::once());
        CrawlContext::with_transport(config, Arc::new(mock.clone())).with_fetcher(fetcher)
    }

    fn member_grid(names: &[(&str, u32)], next: Option<&str>, current: usize) -> String {
        let rows: Vec<Vec<String>> = names
            .iter()
            .map(|(name, id)| {
                vec![
                    format!(r#"<a href="PersonDetail.aspx?ID={id}&amp;GUID=G">{name}</a>"#),
                    "Alderman".to_string(),
                ]
            })
            .collect();
        fixtures::grid(PEOPLE_GRID, &["Person Name", "Title"], &rows, &fixtures::pager(current, next))
    }

    #[tokio::test]
    async fn test_members_with_detail_pages() {
        let detail = format!(
            "{}<img id=\"ctl00_ContentPlaceHolder1_imgPhoto\" src=\"ImageHandler.ashx?ID=1\" />{}",
            fixtures::detail_div(PERSON_DETAIL_DIV, &[("EMail", "E-mail", "ada@example.org")]),
            fixtures::grid(
                COMMITTEE_GRID,
                &["Department Name", "Title"],
                &[vec!["Finance".into(), "Chair".into()]],
                ""
            )
        );
        let mock = MockTransport::new()
            .once_url(PEOPLE, MockReply::html(fixtures::form_page("V1", Some("E"), &member_grid(&[("Ada", 1)], Some("p2"), 1))))
            .once_url(PEOPLE, MockReply::html(fixtures::form_page("V2", Some("E"), &member_grid(&[("Bo", 2)], None, 2))))
            .always_url(
                "https://metro.legistar.com/PersonDetail.aspx?ID=1&GUID=G",
                MockReply::html(fixtures::form_page("D1", None, &detail)),
            )
            .always_url(
                "https://metro.legistar.com/PersonDetail.aspx?ID=2&GUID=G",
                MockReply::html(fixtures::form_page("D2", None, "")),
            );
        let ctx = context(&mock);

        let mut members = CouncilMembers::new(&ctx);
        let ada = members.next().await.unwrap().unwrap();
        assert_eq!(ada.details.unwrap().text_of("E-mail").as_deref(), Some("ada@example.org"));
        assert_eq!(ada.photo.as_deref(), Some("https://metro.legistar.com/ImageHandler.ashx?ID=1"));
        assert_eq!(ada.committees[0].text_of("Department Name").as_deref(), Some("Finance"));

        let bo = members.next().await.unwrap().unwrap();
        assert!(bo.details.is_none());
        assert!(bo.committees.is_empty());
        assert!(members.next().await.unwrap().is_none());

        // The second grid page still posts the grid's own tokens.
        let grid_post = mock
            .calls()
            .into_iter()
            .find(|r| r.url == PEOPLE && r.form.is_some())
            .unwrap();
        assert_eq!(grid_post.form.unwrap()["__VIEWSTATE"], "V1");
    }

    #[tokio::test]
    async fn test_without_following_links() {
        let mock = MockTransport::new().once_url(
            PEOPLE,
            MockReply::html(fixtures::form_page("V1", None, &member_grid(&[("Ada", 1)], None, 1))),
        );
        let ctx = context(&mock);

        let mut members = CouncilMembers::new(&ctx).with_follow_links(false);
        let ada = members.next().await.unwrap().unwrap();
        assert_eq!(ada.row.text_of("Person Name").as_deref(), Some("Ada"));
        assert!(members.next().await.unwrap().is_none());
        assert_eq!(mock.call_count(), 1);
    }

    struct NoClerk;

    impl JurisdictionHooks for NoClerk {
        fn drop_organization(&self, name: &str) -> bool {
            name == "Office of the City Clerk"
        }
    }

    #[tokio::test]
    async fn test_office_records_filter_and_memberships() {
        let mock = MockTransport::new().once_url(
            "https://webapi.legistar.com/v1/metro/officerecords",
            MockReply::json(
                r#"[
                {"OfficeRecordId": 1, "OfficeRecordPersonId": 4, "OfficeRecordFullName": "Ada", "OfficeRecordBodyName": "City Council", "OfficeRecordTitle": "Alderman", "OfficeRecordStartDate": "2019-05-20T00:00:00"},
                {"OfficeRecordId": 2, "OfficeRecordPersonId": 4, "OfficeRecordFullName": "Ada", "OfficeRecordBodyName": "Office of the City Clerk"},
                {"OfficeRecordId": 3, "OfficeRecordPersonId": 5, "OfficeRecordFullName": "Bo", "OfficeRecordBodyName": "City Council"}
            ]"#,
            ),
        );
        let ctx = context(&mock).with_hooks(Arc::new(NoClerk));
        let people = ApiPeople::new(&ctx);

        let records = people.office_records(9).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(mock.calls()[0].query_value("$filter"), Some("OfficeRecordBodyId eq 9"));

        let ada = ApiPerson {
            person_id: 4,
            person_full_name: "Ada ".into(),
            person_email: Some("".into()),
            ..Default::default()
        };
        let person = people.person(&ada, &records);
        assert_eq!(person.name, "Ada");
        assert_eq!(person.email, None);
        assert_eq!(person.memberships.len(), 1);
        assert_eq!(person.memberships[0].start_date.as_deref(), Some("2019-05-20"));
        assert_eq!(person.memberships[0].role.as_deref(), Some("Alderman"));

        let clerk = ApiBody {
            body_id: 2,
            body_name: "Office of the City Clerk".into(),
            ..Default::default()
        };
        assert!(people.organization(&clerk).is_none());
    }
}
