//! REST interface entities, as the server sends them.
//!
//! Field names follow the platform's PascalCase JSON; a handful of acronyms
//! (`URL`, `UTC`, `WWW`) need explicit renames. Every field tolerates
//! absence, and a JSON `null` reads as the field's default.

use serde::{Deserialize, Deserializer, Serialize};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub event_id: i64,
    pub event_guid: Option<String>,
    pub event_last_modified_utc: Option<String>,
    pub event_body_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub event_body_name: String,
    /// Local date at midnight, `%Y-%m-%dT%H:%M:%S`.
    pub event_date: Option<String>,
    /// Manually entered, usually `%I:%M %p`.
    pub event_time: Option<String>,
    pub event_location: Option<String>,
    pub event_comment: Option<String>,
    pub event_agenda_file: Option<String>,
    pub event_minutes_file: Option<String>,
    pub event_agenda_status_name: Option<String>,
    pub event_minutes_status_name: Option<String>,
    pub event_video_path: Option<String>,
    #[serde(rename = "EventInSiteURL")]
    pub event_in_site_url: Option<String>,
    #[serde(rename = "EventAgendaLastPublishedUTC")]
    pub event_agenda_last_published_utc: Option<String>,
    #[serde(rename = "EventMinutesLastPublishedUTC")]
    pub event_minutes_last_published_utc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiEventItem {
    #[serde(deserialize_with = "null_as_default")]
    pub event_item_id: i64,
    pub event_item_event_id: Option<i64>,
    pub event_item_title: Option<String>,
    pub event_item_agenda_sequence: Option<i64>,
    pub event_item_minutes_sequence: Option<i64>,
    pub event_item_agenda_number: Option<String>,
    pub event_item_action_name: Option<String>,
    pub event_item_passed_flag_name: Option<String>,
    pub event_item_roll_call_flag: Option<i64>,
    pub event_item_matter_id: Option<i64>,
    pub event_item_matter_file: Option<String>,
    pub event_item_matter_type: Option<String>,
    pub event_item_mover: Option<String>,
    pub event_item_seconder: Option<String>,
    pub event_item_tally: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiMatter {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_id: i64,
    pub matter_guid: Option<String>,
    pub matter_file: Option<String>,
    pub matter_name: Option<String>,
    pub matter_title: Option<String>,
    pub matter_type_name: Option<String>,
    pub matter_status_name: Option<String>,
    pub matter_body_name: Option<String>,
    pub matter_intro_date: Option<String>,
    pub matter_agenda_date: Option<String>,
    pub matter_passed_date: Option<String>,
    pub matter_enactment_date: Option<String>,
    pub matter_enactment_number: Option<String>,
    pub matter_last_modified_utc: Option<String>,
    pub matter_version: Option<String>,
    pub matter_restrict_view_via_web: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiMatterHistory {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_history_id: i64,
    pub matter_history_action_date: Option<String>,
    pub matter_history_action_name: Option<String>,
    pub matter_history_action_body_name: Option<String>,
    pub matter_history_action_text: Option<String>,
    pub matter_history_passed_flag: Option<i64>,
    pub matter_history_passed_flag_name: Option<String>,
    pub matter_history_roll_call_flag: Option<i64>,
    pub matter_history_mover_name: Option<String>,
    pub matter_history_seconder_name: Option<String>,
    pub matter_history_tally: Option<String>,
    pub matter_history_event_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiSponsor {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_sponsor_id: i64,
    pub matter_sponsor_matter_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_sponsor_matter_version: String,
    pub matter_sponsor_name_id: Option<i64>,
    pub matter_sponsor_body_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_sponsor_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_sponsor_sequence: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiRelation {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_relation_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_relation_matter_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_relation_flag: i64,
}

/// Entry of `/matters/{id}/versions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiVersion {
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiText {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_text_id: i64,
    pub matter_text_version: Option<String>,
    pub matter_text_plain: Option<String>,
    pub matter_text_rtf: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiAttachment {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_attachment_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_attachment_name: String,
    pub matter_attachment_hyperlink: Option<String>,
    pub matter_attachment_file_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiIndex {
    #[serde(deserialize_with = "null_as_default")]
    pub matter_index_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub matter_index_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiVote {
    #[serde(deserialize_with = "null_as_default")]
    pub vote_id: i64,
    pub vote_person_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub vote_person_name: String,
    pub vote_value_name: Option<String>,
    pub vote_result: Option<i64>,
    pub vote_sort: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiRollCall {
    #[serde(deserialize_with = "null_as_default")]
    pub roll_call_id: i64,
    pub roll_call_person_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub roll_call_person_name: String,
    pub roll_call_value_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiBody {
    #[serde(deserialize_with = "null_as_default")]
    pub body_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub body_name: String,
    pub body_type_name: Option<String>,
    pub body_active_flag: Option<i64>,
    pub body_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiPerson {
    #[serde(deserialize_with = "null_as_default")]
    pub person_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub person_full_name: String,
    pub person_first_name: Option<String>,
    pub person_last_name: Option<String>,
    pub person_email: Option<String>,
    #[serde(rename = "PersonWWW")]
    pub person_www: Option<String>,
    pub person_active_flag: Option<i64>,
    pub person_last_modified_utc: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ApiOfficeRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub office_record_id: i64,
    pub office_record_person_id: Option<i64>,
    #[serde(deserialize_with = "null_as_default")]
    pub office_record_full_name: String,
    pub office_record_body_id: Option<i64>,
    pub office_record_body_name: Option<String>,
    pub office_record_title: Option<String>,
    pub office_record_member_type: Option<String>,
    pub office_record_start_date: Option<String>,
    pub office_record_end_date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_acronym_fields() {
        let event: ApiEvent = serde_json::from_value(serde_json::json!({
            "EventId": 4521,
            "EventBodyName": "City Council",
            "EventDate": "2020-01-02T00:00:00",
            "EventTime": "6:00 PM",
            "EventInSiteURL": "https://metro.legistar.com/MeetingDetail.aspx?ID=4521",
            "EventAgendaLastPublishedUTC": "2019-12-30T17:00:00.197",
            "SomethingNew": true
        }))
        .unwrap();

        assert_eq!(event.event_id, 4521);
        assert_eq!(event.event_time.as_deref(), Some("6:00 PM"));
        assert!(event.event_in_site_url.unwrap().ends_with("ID=4521"));
        assert!(event.event_agenda_last_published_utc.is_some());
        assert_eq!(event.event_minutes_file, None);
    }

    #[test]
    fn test_matter_tolerates_nulls() {
        let matter: ApiMatter = serde_json::from_value(serde_json::json!({
            "MatterId": 9,
            "MatterFile": null,
            "MatterRestrictViewViaWeb": false
        }))
        .unwrap();
        assert_eq!(matter.matter_id, 9);
        assert_eq!(matter.matter_file, None);
        assert_eq!(matter.matter_restrict_view_via_web, Some(false));
    }

    #[test]
    fn test_null_required_fields_read_as_defaults() {
        let sponsors: Vec<ApiSponsor> = serde_json::from_value(serde_json::json!([
            {"MatterSponsorId": 1, "MatterSponsorName": "Ada", "MatterSponsorSequence": 0},
            {"MatterSponsorId": 2, "MatterSponsorName": null, "MatterSponsorSequence": null, "MatterSponsorMatterVersion": null}
        ]))
        .unwrap();
        assert_eq!(sponsors.len(), 2);
        assert_eq!(sponsors[1].matter_sponsor_name, "");
        assert_eq!(sponsors[1].matter_sponsor_sequence, 0);

        let vote: ApiVote = serde_json::from_value(serde_json::json!({
            "VoteId": 3,
            "VotePersonName": null,
            "VoteValueName": "Aye"
        }))
        .unwrap();
        assert_eq!(vote.vote_id, 3);
        assert_eq!(vote.vote_person_name, "");
    }
}
