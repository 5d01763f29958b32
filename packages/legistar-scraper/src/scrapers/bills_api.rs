//! REST matters and everything hanging off them.

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::get_list;
use crate::context::CrawlContext;
use crate::error::{FetchError, Result};
use crate::extract::media_type_for_name;
use crate::http::is_missing_votes;
use crate::normalize::{clean_history, latest_sponsors, select_version, VoteOptionMap, VoteTally};
use crate::paging::{RestPager, SearchWindow};
use crate::traits::transport::{HttpRequest, HttpResponse};
use crate::types::api::{
    ApiAttachment, ApiIndex, ApiMatter, ApiMatterHistory, ApiRelation, ApiSponsor, ApiText, ApiVersion, ApiVote,
};
use crate::types::records::{
    Ballot, Bill, BillAction, Document, RelatedBill, SourceLink, Sponsorship, VoteEvent,
};

/// Timestamps whose advance makes a matter worth revisiting.
pub const MATTER_SINCE_FIELDS: &[&str] = &[
    "MatterLastModifiedUtc",
    "MatterIntroDate",
    "MatterPassedDate",
    "MatterAgendaDate",
];

/// Text bodies at or above this size are not decoded.
pub const MAX_TEXT_BYTES: u64 = 21_052_630;

/// REST matter routes and bill assembly.
pub struct ApiBills<'c> {
    ctx: &'c CrawlContext,
}

impl<'c> ApiBills<'c> {
    pub fn new(ctx: &'c CrawlContext) -> Self {
        Self { ctx }
    }

    fn route(&self, route: String) -> HttpRequest {
        HttpRequest::get(self.ctx.config.api_url(&route))
    }

    /// Matters changed since `since`, oldest change first.
    pub fn search(&self, since: Option<NaiveDateTime>) -> RestPager<'c, ApiMatter> {
        RestPager::new(&self.ctx.fetcher, self.ctx.config.api_url("matters"), "MatterId")
            .with_filter(SearchWindow::new(since).filter(MATTER_SINCE_FIELDS))
            .with_orderby("MatterLastModifiedUtc")
    }

    pub async fn matter(&self, matter_id: i64) -> Result<ApiMatter> {
        let response = self.checked(self.route(format!("matters/{}", matter_id))).await?;
        Ok(response.json()?)
    }

    /// Action history: complete entries only, by date, adjacent repeats
    /// removed.
    pub async fn history(&self, matter_id: i64) -> Result<Vec<ApiMatterHistory>> {
        let raw = get_list(self.ctx, self.route(format!("matters/{}/histories", matter_id))).await?;
        Ok(clean_history(raw))
    }

    /// Sponsors of the latest version, in sequence, minus dropped entries.
    pub async fn sponsors(&self, matter_id: i64) -> Result<Vec<ApiSponsor>> {
        let raw: Vec<ApiSponsor> = get_list(self.ctx, self.route(format!("matters/{}/sponsors", matter_id))).await?;
        let hooks = &self.ctx.hooks;
        Ok(latest_sponsors(raw, hooks.version_ranker())
            .into_iter()
            .filter(|sponsor| {
                let drop = hooks.drop_sponsor(sponsor);
                if drop {
                    debug!(matter_id, sponsor = %sponsor.matter_sponsor_name, "Dropping sponsor");
                }
                !drop
            })
            .collect())
    }

    /// Related matters, one per related id.
    pub async fn relations(&self, matter_id: i64) -> Result<Vec<RelatedBill>> {
        let raw: Vec<ApiRelation> =
            get_list(self.ctx, self.route(format!("matters/{}/relations", matter_id))).await?;
        let candidates = raw.iter().map(RelatedBill::from).collect();
        Ok(self.ctx.hooks.relation_filter().filter(candidates))
    }

    pub async fn versions(&self, matter_id: i64) -> Result<Vec<ApiVersion>> {
        get_list(self.ctx, self.route(format!("matters/{}/versions", matter_id))).await
    }

    /// Text of `explicit`, or of the latest version when it is `None` or
    /// unlisted.
    pub async fn text(&self, matter_id: i64, explicit: Option<&str>) -> Result<Option<ApiText>> {
        let versions = self.versions(matter_id).await?;
        let Some(version) = select_version(&versions, explicit, self.ctx.hooks.version_ranker()) else {
            debug!(matter_id, "Matter has no versions");
            return Ok(None);
        };
        self.text_of(matter_id, version).await
    }

    async fn text_of(&self, matter_id: i64, version: &ApiVersion) -> Result<Option<ApiText>> {
        let request = self.route(format!("matters/{}/texts/{}", matter_id, version.key));
        let response = self.checked(request).await?;

        let size = response.content_length.unwrap_or(response.body.len() as u64);
        if size >= MAX_TEXT_BYTES {
            warn!(matter_id, version = %version.value, size, "Matter text too large, skipping");
            return Ok(None);
        }
        Ok(Some(response.json()?))
    }

    pub async fn attachments(&self, matter_id: i64) -> Result<Vec<ApiAttachment>> {
        get_list(self.ctx, self.route(format!("matters/{}/attachments", matter_id))).await
    }

    /// Index names, used as subjects.
    pub async fn topics(&self, matter_id: i64) -> Result<Vec<String>> {
        let raw: Vec<ApiIndex> = get_list(self.ctx, self.route(format!("matters/{}/indexes", matter_id))).await?;
        Ok(raw.into_iter().map(|index| index.matter_index_name).collect())
    }

    /// Individual votes on a history item. Roll calls recorded without
    /// ballots come back as the server's permanent 500; that is no votes.
    pub async fn votes(&self, history_id: i64) -> Result<Vec<ApiVote>> {
        let request = self.route(format!("eventitems/{}/votes", history_id));
        let url = request.display_url();
        let response = self.ctx.fetcher.fetch(request).await?;

        if is_missing_votes(&response) {
            info!(history_id, "No individual votes recorded");
            return Ok(Vec::new());
        }
        if !response.is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status,
            }
            .into());
        }
        Ok(response.json()?)
    }

    /// Web detail page of a matter, via the gateway redirect. `None` when the
    /// page is forbidden or gone.
    pub async fn web_detail_url(&self, matter_id: i64) -> Result<Option<String>> {
        let gateway = self
            .ctx
            .config
            .web_url(&format!("gateway.aspx?m=l&id=/matter.aspx?key={}", matter_id));

        match self.ctx.fetcher.fetch(HttpRequest::head(&gateway)).await {
            Ok(response) if matches!(response.status, 403 | 410) => Ok(None),
            Ok(response) if response.is_success() => Ok(Some(response.final_url)),
            Ok(response) => Err(FetchError::Status {
                url: gateway,
                status: response.status,
            }
            .into()),
            Err(e) if e.is_restricted() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn checked(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.display_url();
        let response = self.ctx.fetcher.fetch(request).await?;
        if !response.is_success() {
            return Err(FetchError::Status {
                url,
                status: response.status,
            }
            .into());
        }
        Ok(response)
    }

    /// Assemble the full bill. `None` when the matter has no file number, or
    /// is restricted on the web and restricted bills are not kept.
    pub async fn bill(&self, matter: &ApiMatter) -> Result<Option<Bill>> {
        let matter_id = matter.matter_id;
        let Some(identifier) = matter.matter_file.as_deref().map(str::trim).filter(|f| !f.is_empty()) else {
            warn!(matter_id, "Matter has no file number, skipping");
            return Ok(None);
        };

        let web_url = if matter.matter_restrict_view_via_web == Some(true) {
            None
        } else {
            self.web_detail_url(matter_id).await?
        };
        if web_url.is_none() {
            if !self.ctx.config.keep_restricted_bills {
                warn!(matter_id, identifier, "Bill restricted on the web interface, skipping");
                return Ok(None);
            }
            warn!(matter_id, identifier, "Bill restricted on the web interface, keeping");
        }

        let history = self.history(matter_id).await?;
        let sponsors = self.sponsors(matter_id).await?;
        let related_bills = self.relations(matter_id).await?;
        let versions = self.versions(matter_id).await?;
        let version = select_version(
            &versions,
            matter.matter_version.as_deref(),
            self.ctx.hooks.version_ranker(),
        );
        let text = match version {
            Some(version) => self.text_of(matter_id, version).await?,
            None => None,
        };
        let attachments = self.attachments(matter_id).await?;
        let subjects = self.topics(matter_id).await?;

        let options = self.ctx.vote_options();
        let mut votes = Vec::new();
        for entry in history.iter().filter(|e| e.matter_history_passed_flag.is_some()) {
            let ballots = self.votes(entry.matter_history_id).await?;
            votes.push(self.vote_event(identifier, entry, &ballots, &options));
        }

        let mut sources = vec![SourceLink::new(self.ctx.config.api_url(&format!("matters/{}", matter_id))).with_note("api")];
        if let Some(url) = web_url {
            sources.push(SourceLink::new(url).with_note("web"));
        }

        Ok(Some(Bill {
            id: matter_id,
            identifier: identifier.to_string(),
            title: matter
                .matter_title
                .clone()
                .or_else(|| matter.matter_name.clone())
                .unwrap_or_default()
                .trim()
                .to_string(),
            classification: matter.matter_type_name.clone(),
            status: matter.matter_status_name.clone(),
            latest_version: version.map(|v| v.value.clone()),
            text: text.and_then(|t| t.matter_text_plain),
            subjects,
            actions: history.iter().map(|entry| self.action(entry)).collect(),
            sponsorships: sponsorships(&sponsors),
            related_bills,
            documents: attachments.iter().filter_map(attachment_document).collect(),
            votes,
            sources,
        }))
    }

    fn action(&self, entry: &ApiMatterHistory) -> BillAction {
        let description = entry.matter_history_action_name.clone().unwrap_or_default();
        BillAction {
            classification: self.ctx.hooks.classify_motion(&description),
            date: local_date(entry.matter_history_action_date.as_deref()),
            organization: entry.matter_history_action_body_name.clone().unwrap_or_default(),
            description,
        }
    }

    fn vote_event(
        &self,
        identifier: &str,
        entry: &ApiMatterHistory,
        votes: &[ApiVote],
        options: &VoteOptionMap,
    ) -> VoteEvent {
        let motion_text = entry
            .matter_history_action_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .or(entry.matter_history_action_name.as_deref())
            .unwrap_or_default()
            .to_string();

        let raw_result = match (&entry.matter_history_passed_flag_name, entry.matter_history_passed_flag) {
            (Some(name), _) => name.clone(),
            (None, Some(1)) => "pass".to_string(),
            _ => "fail".to_string(),
        };

        let ballots: Vec<Ballot> = votes
            .iter()
            .map(|vote| Ballot {
                voter: vote.vote_person_name.trim().to_string(),
                option: options.normalize(vote.vote_value_name.as_deref().unwrap_or_default()),
            })
            .collect();
        let counts = VoteTally::from_ballots(&ballots).counts();

        VoteEvent {
            motion_classification: self.ctx.hooks.classify_motion(&motion_text),
            motion_text,
            start_date: local_date(entry.matter_history_action_date.as_deref()),
            organization: entry.matter_history_action_body_name.clone().unwrap_or_default(),
            result: options.normalize(&raw_result),
            bill_identifier: Some(identifier.to_string()),
            ballots,
            counts,
            sources: vec![SourceLink::new(
                self.ctx
                    .config
                    .api_url(&format!("eventitems/{}/votes", entry.matter_history_id)),
            )],
        }
    }
}

/// Date part of a platform timestamp.
fn local_date(stamp: Option<&str>) -> String {
    let stamp = stamp.unwrap_or_default();
    stamp.get(..10).unwrap_or(stamp).to_string()
}

fn sponsorships(sponsors: &[ApiSponsor]) -> Vec<Sponsorship> {
    sponsors
        .iter()
        .enumerate()
        .map(|(i, sponsor)| Sponsorship {
            name: sponsor.matter_sponsor_name.trim().to_string(),
            primary: i == 0,
            sequence: sponsor.matter_sponsor_sequence,
            entity_type: "person".to_string(),
        })
        .collect()
}

fn attachment_document(attachment: &ApiAttachment) -> Option<Document> {
    let url = attachment
        .matter_attachment_hyperlink
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())?;
    let media_type = attachment
        .matter_attachment_file_name
        .as_deref()
        .and_then(media_type_for_name)
        .or_else(|| media_type_for_name(url));
    Some(Document {
        note: attachment.matter_attachment_name.trim().to_string(),
        url: url.to_string(),
        media_type,
    })
}
