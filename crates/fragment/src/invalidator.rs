use pfa_event::ClusterId;

use crate::contact_map::{AffectedClusters, ContactMap};
use crate::error::{FragmentError, Result};

/// Clusters whose contacts go stale when `daughter` merges into `parent`
///
/// The set holds every parent the daughter was in contact with, plus every
/// other daughter that lists `parent` or `daughter` as one of its parents.
/// `contacts` must still hold the daughter's entry.
pub fn affected_clusters(contacts: &ContactMap, parent: ClusterId, daughter: ClusterId) -> Result<AffectedClusters> {
    let daughter_contacts = contacts
        .get(&daughter)
        .ok_or_else(|| FragmentError::invariant(format!("{daughter} has no entry in the contact map")))?;

    let mut affected: AffectedClusters = daughter_contacts.iter().map(|contact| contact.parent).collect();

    for (&id, cluster_contacts) in contacts {
        if id == daughter {
            continue;
        }
        if cluster_contacts
            .iter()
            .any(|contact| contact.parent == parent || contact.parent == daughter)
        {
            affected.insert(id);
        }
    }

    Ok(affected)
}
