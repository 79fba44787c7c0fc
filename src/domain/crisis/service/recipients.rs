use crate::core::persistence::alerts::crisis_alert_entity::Severity;
use crate::domain::crisis::model::care_team::{
    CareTeam, NotificationRecipients, TeamMember, ROLE_CARE_MANAGER, ROLE_NURSE, ROLE_PHYSICIAN,
    ROLE_SOCIAL_WORKER,
};

/// Roles paged for a severity. `None` means every member of the team.
pub fn roles_for_severity(severity: Severity) -> Option<&'static [&'static str]> {
    match severity {
        Severity::Immediate => None,
        Severity::Urgent => Some(&[ROLE_PHYSICIAN, ROLE_NURSE, ROLE_SOCIAL_WORKER]),
        Severity::Elevated => Some(&[ROLE_PHYSICIAN, ROLE_SOCIAL_WORKER]),
        Severity::Moderate => Some(&[ROLE_CARE_MANAGER]),
        Severity::None => Some(&[]),
    }
}

/// Whether responders with `role` are paged for alerts at `severity`.
pub fn role_receives(role: &str, severity: Severity) -> bool {
    match roles_for_severity(severity) {
        None => true,
        Some(roles) => roles.iter().any(|r| r.eq_ignore_ascii_case(role)),
    }
}

/// Maps severity and care team to recipients.
///
/// IMMEDIATE pages everyone on every channel they have. URGENT adds phone
/// numbers for the clinical roles. Lower tiers go out as push only.
pub fn determine_recipients(severity: Severity, team: &CareTeam) -> NotificationRecipients {
    let mut recipients = NotificationRecipients::default();

    for member in team.members.iter().filter(|m| role_receives(&m.role, severity)) {
        add_member(&mut recipients, member, severity);
    }

    recipients
}

/// Adds on-call staff, skipping anyone already paged.
pub fn merge_on_call(recipients: &mut NotificationRecipients, on_call: &[TeamMember], severity: Severity) {
    for member in on_call {
        if !recipients.user_ids.contains(&member.user_id) {
            add_member(recipients, member, severity);
        }
    }
}

fn add_member(recipients: &mut NotificationRecipients, member: &TeamMember, severity: Severity) {
    push_unique(&mut recipients.user_ids, &member.user_id);

    if matches!(severity, Severity::Immediate | Severity::Urgent) {
        if let Some(phone) = member.phone.as_deref() {
            push_unique(&mut recipients.phone_numbers, phone);
        }
    }

    if severity == Severity::Immediate {
        if let Some(email) = member.email.as_deref() {
            push_unique(&mut recipients.emails, email);
        }
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
