//! Resolution of location tokens into concrete query targets.

use crate::availability::QueryTarget;
use crate::intent::LocationToken;
use crate::locations::LocationIndex;
use crate::subscribers::{LocationPreference, Subscriber};
use crate::{NotifierError, NotifierResult};
use notifier_types::{DistrictId, Pincode};
use std::sync::Arc;

/// A resolved location, ready to query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// Valid pincodes, in request order, without duplicates. Never empty.
    Pincodes(Vec<Pincode>),
    District { id: DistrictId, name: String },
}

impl ResolvedTarget {
    /// Expand into individual API targets, each paired with a display label.
    pub fn query_targets(&self) -> Vec<(QueryTarget, String)> {
        match self {
            ResolvedTarget::Pincodes(pins) => pins
                .iter()
                .map(|pin| (QueryTarget::Pincode(pin.clone()), pin.to_string()))
                .collect(),
            ResolvedTarget::District { id, name } => {
                let label = LocationPreference::District {
                    id: *id,
                    name: name.clone(),
                }
                .label();
                vec![(QueryTarget::District(*id), label)]
            }
        }
    }
}

impl From<&LocationPreference> for ResolvedTarget {
    fn from(pref: &LocationPreference) -> Self {
        match pref {
            LocationPreference::Pincode { pincode } => {
                ResolvedTarget::Pincodes(vec![pincode.clone()])
            }
            LocationPreference::District { id, name } => ResolvedTarget::District {
                id: *id,
                name: name.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub target: ResolvedTarget,
    /// Pincode candidates that were not six digits. Each is reported to the user on its own.
    pub rejected: Vec<String>,
}

/// Turns [`LocationToken`]s into [`ResolvedTarget`]s using the location index and, for
/// unspecified locations, the subscriber's stored preference.
#[derive(Debug, Clone)]
pub struct QueryResolver {
    index: Arc<LocationIndex>,
}

impl QueryResolver {
    pub fn new(index: Arc<LocationIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    /// Resolve a token for a query.
    ///
    /// # Errors
    ///
    /// - `InvalidPincode` if every pincode candidate is malformed (the first one is named)
    /// - `DistrictNotFound` if no district key contains the keyword
    /// - `NoLocationSpecified` if the token is unspecified and there is no subscriber
    pub fn resolve(
        &self,
        token: &LocationToken,
        subscriber: Option<&Subscriber>,
    ) -> NotifierResult<Resolved> {
        match token {
            LocationToken::Pincodes(candidates) => resolve_pincodes(candidates),
            LocationToken::DistrictKeyword(keyword) => Ok(Resolved {
                target: self.resolve_district(keyword)?,
                rejected: Vec::new(),
            }),
            LocationToken::Unspecified => subscriber
                .map(|s| Resolved {
                    target: ResolvedTarget::from(&s.preference),
                    rejected: Vec::new(),
                })
                .ok_or(NotifierError::NoLocationSpecified),
        }
    }

    /// Resolve a token into a preference to store on setup.
    ///
    /// Unlike [`QueryResolver::resolve`], an unspecified location is always an error, and only
    /// the first valid pincode is kept.
    pub fn preference_for(&self, token: &LocationToken) -> NotifierResult<LocationPreference> {
        match token {
            LocationToken::Pincodes(candidates) => {
                let resolved = resolve_pincodes(candidates)?;
                match resolved.target {
                    ResolvedTarget::Pincodes(mut pins) if !pins.is_empty() => {
                        Ok(LocationPreference::Pincode {
                            pincode: pins.swap_remove(0),
                        })
                    }
                    _ => Err(NotifierError::NoLocationSpecified),
                }
            }
            LocationToken::DistrictKeyword(keyword) => match self.resolve_district(keyword)? {
                ResolvedTarget::District { id, name } => {
                    Ok(LocationPreference::District { id, name })
                }
                ResolvedTarget::Pincodes(_) => Err(NotifierError::DistrictNotFound(keyword.clone())),
            },
            LocationToken::Unspecified => Err(NotifierError::NoLocationSpecified),
        }
    }

    fn resolve_district(&self, keyword: &str) -> NotifierResult<ResolvedTarget> {
        self.index
            .lookup(keyword)
            .map(|(name, id)| ResolvedTarget::District {
                id,
                name: name.to_string(),
            })
            .ok_or_else(|| NotifierError::DistrictNotFound(keyword.to_string()))
    }
}

fn resolve_pincodes(candidates: &[String]) -> NotifierResult<Resolved> {
    let mut valid: Vec<Pincode> = Vec::new();
    let mut rejected = Vec::new();

    for candidate in candidates {
        match Pincode::parse(candidate) {
            Ok(pin) if !valid.contains(&pin) => valid.push(pin),
            Ok(_) => {}
            Err(_) => rejected.push(candidate.clone()),
        }
    }

    if valid.is_empty() {
        let first = rejected.into_iter().next().unwrap_or_default();
        return Err(NotifierError::InvalidPincode(first));
    }

    Ok(Resolved {
        target: ResolvedTarget::Pincodes(valid),
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::AgeTier;
    use notifier_types::UserId;

    fn resolver() -> QueryResolver {
        QueryResolver::new(Arc::new(LocationIndex::from_entries([
            ("Pune", DistrictId::new(363)),
            ("Mumbai", DistrictId::new(395)),
        ])))
    }

    fn pins(values: &[&str]) -> LocationToken {
        LocationToken::Pincodes(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn district_keyword_substring_match() {
        let resolved = resolver()
            .resolve(&LocationToken::DistrictKeyword("pun".into()), None)
            .unwrap();
        assert_eq!(
            resolved.target,
            ResolvedTarget::District {
                id: DistrictId::new(363),
                name: "pune".into()
            }
        );

        let err = resolver()
            .resolve(&LocationToken::DistrictKeyword("zzz".into()), None)
            .unwrap_err();
        assert!(matches!(err, NotifierError::DistrictNotFound(k) if k == "zzz"));
    }

    #[test]
    fn invalid_pincodes_reported_individually() {
        let resolved = resolver()
            .resolve(&pins(&["560001", "1234", "560001", "110001", "9999999"]), None)
            .unwrap();
        assert_eq!(
            resolved.target,
            ResolvedTarget::Pincodes(vec![
                Pincode::parse("560001").unwrap(),
                Pincode::parse("110001").unwrap()
            ])
        );
        assert_eq!(resolved.rejected, vec!["1234".to_string(), "9999999".to_string()]);

        let err = resolver().resolve(&pins(&["12", "1234"]), None).unwrap_err();
        assert!(matches!(err, NotifierError::InvalidPincode(p) if p == "12"));
    }

    #[test]
    fn unspecified_uses_subscriber_preference() {
        assert!(matches!(
            resolver().resolve(&LocationToken::Unspecified, None),
            Err(NotifierError::NoLocationSpecified)
        ));

        let subscriber = Subscriber {
            user_id: UserId::new("u1").unwrap(),
            preference: LocationPreference::District {
                id: DistrictId::new(395),
                name: "mumbai".into(),
            },
            age_tier: AgeTier::Under45,
        };
        let resolved = resolver()
            .resolve(&LocationToken::Unspecified, Some(&subscriber))
            .unwrap();
        assert_eq!(
            resolved.target.query_targets(),
            vec![(QueryTarget::District(DistrictId::new(395)), "Mumbai".into())]
        );
    }

    #[test]
    fn explicit_location_ignores_subscriber() {
        let subscriber = Subscriber {
            user_id: UserId::new("u1").unwrap(),
            preference: LocationPreference::Pincode {
                pincode: Pincode::parse("110001").unwrap(),
            },
            age_tier: AgeTier::Under45,
        };
        let resolved = resolver()
            .resolve(&pins(&["560001"]), Some(&subscriber))
            .unwrap();
        assert_eq!(
            resolved.target,
            ResolvedTarget::Pincodes(vec![Pincode::parse("560001").unwrap()])
        );
    }

    #[test]
    fn preference_for_setup() {
        assert_eq!(
            resolver().preference_for(&pins(&["123", "560001", "110001"])).unwrap(),
            LocationPreference::Pincode {
                pincode: Pincode::parse("560001").unwrap()
            }
        );
        assert_eq!(
            resolver()
                .preference_for(&LocationToken::DistrictKeyword("mum".into()))
                .unwrap(),
            LocationPreference::District {
                id: DistrictId::new(395),
                name: "mumbai".into()
            }
        );
        assert!(matches!(
            resolver().preference_for(&LocationToken::Unspecified),
            Err(NotifierError::NoLocationSpecified)
        ));
    }
}
