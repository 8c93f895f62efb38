// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Protocol detection from advertisement data.
//!
//! Name patterns are checked first, most specific first. Without a name match
//! only service identifiers claimed by a single family resolve; identifiers
//! shared by several families yield [`Detection::Ambiguous`].

use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::bluetooth::ble_constants::*;
use crate::error::{BedError, Result};
use crate::protocol::{all_descriptors, ProtocolId};

/// Outcome of [`identify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Protocol(ProtocolId),
    /// Shared identifiers; manual selection required.
    Ambiguous(Vec<ProtocolId>),
    Unknown,
}

impl Detection {
    pub fn protocol(&self) -> Option<ProtocolId> {
        match self {
            Detection::Protocol(id) => Some(*id),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<ProtocolId> {
        match self {
            Detection::Protocol(id) => Ok(id),
            Detection::Ambiguous(candidates) => Err(BedError::AmbiguousProtocol { candidates }),
            Detection::Unknown => Err(BedError::UnknownProtocol(
                "no matching name or service".to_string(),
            )),
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::Protocol(id) => write!(f, "{}", id),
            Detection::Ambiguous(candidates) => {
                let names: Vec<&str> = candidates.iter().map(|id| id.as_str()).collect();
                write!(f, "ambiguous ({})", names.join(", "))
            }
            Detection::Unknown => f.write_str("unknown"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Prefix(&'static str),
    Contains(&'static str),
}

impl Pattern {
    fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Prefix(p) => name.starts_with(p),
            Pattern::Contains(p) => name.contains(p),
        }
    }
}

/// What a name pattern points at. Some brands ship several wire protocols
/// and need the advertised services to pick one.
#[derive(Debug, Clone, Copy)]
enum Brand {
    Fixed(ProtocolId),
    Leggett,
    Richmat,
    Malouf,
    /// Recognised, but no descriptor exists for it.
    Foreign(&'static str),
}

impl Brand {
    fn resolve(self, services: &[Uuid]) -> Detection {
        let has = |uuid: Uuid| services.contains(&uuid);
        let id = match self {
            Brand::Fixed(id) => id,
            Brand::Leggett if has(OKIN_SERVICE_UUID) => ProtocolId::LeggettOkin,
            Brand::Leggett if has(WILINKE_SERVICE_UUID) => ProtocolId::LeggettWilinke,
            Brand::Leggett => ProtocolId::LeggettGen2,
            Brand::Richmat if has(WILINKE_SERVICE_UUID) => ProtocolId::RichmatWilinke,
            Brand::Richmat => ProtocolId::RichmatNordic,
            Brand::Malouf if has(OKIN_SERVICE_UUID) => ProtocolId::MaloufNew,
            Brand::Malouf => ProtocolId::MaloufLegacy,
            Brand::Foreign(family) => {
                debug!("Name matches {} which has no descriptor", family);
                return Detection::Unknown;
            }
        };
        Detection::Protocol(id)
    }
}

use Pattern::{Contains, Prefix};

/// Precedence-ordered: a vendor+model pattern must come before the bare
/// vendor pattern it contains.
static NAME_RULES: &[(Pattern, Brand)] = &[
    (Contains("serta-i"), Brand::Fixed(ProtocolId::Ergomotion)),
    (Contains("motion perfect"), Brand::Fixed(ProtocolId::Serta)),
    (Contains("serta"), Brand::Fixed(ProtocolId::Serta)),
    (Contains("mlrm"), Brand::Fixed(ProtocolId::LeggettWilinke)),
    (Contains("leggett"), Brand::Leggett),
    (Contains("l&p"), Brand::Leggett),
    (Contains("dewertokin"), Brand::Fixed(ProtocolId::OkinHandle)),
    (Contains("dewert"), Brand::Fixed(ProtocolId::OkinHandle)),
    (Contains("a h beard"), Brand::Fixed(ProtocolId::OkinHandle)),
    (Contains("hankook"), Brand::Fixed(ProtocolId::OkinHandle)),
    (Contains("okimat"), Brand::Fixed(ProtocolId::OkinUuid)),
    (Contains("okin rf"), Brand::Fixed(ProtocolId::OkinUuid)),
    (Contains("okin ble"), Brand::Fixed(ProtocolId::OkinUuid)),
    (Prefix("okin-"), Brand::Fixed(ProtocolId::OkinUuid)),
    (Contains("nectar"), Brand::Fixed(ProtocolId::Okin7Byte)),
    (Contains("iflex"), Brand::Fixed(ProtocolId::OkinNordic)),
    (Contains("qrrm"), Brand::Richmat),
    (Contains("sleep function"), Brand::Richmat),
    (Prefix("base-i4."), Brand::Fixed(ProtocolId::Keeson)),
    (Prefix("base-i5."), Brand::Fixed(ProtocolId::Keeson)),
    (Contains("ksbt"), Brand::Fixed(ProtocolId::Keeson)),
    (Contains("ergomotion"), Brand::Fixed(ProtocolId::Ergomotion)),
    (Contains("ergo"), Brand::Fixed(ProtocolId::Ergomotion)),
    (Contains("rondure"), Brand::Fixed(ProtocolId::Rondure)),
    (Contains("malouf"), Brand::Malouf),
    (Contains("jiecang"), Brand::Fixed(ProtocolId::Jiecang)),
    (Prefix("jc-"), Brand::Fixed(ProtocolId::Jiecang)),
    (Contains("dream motion"), Brand::Fixed(ProtocolId::Jiecang)),
    (Contains("glide"), Brand::Fixed(ProtocolId::Jiecang)),
    (Prefix("jmc"), Brand::Fixed(ProtocolId::Jensen)),
    (Contains("vmat"), Brand::Fixed(ProtocolId::Vibradorm)),
    (Contains("limoss"), Brand::Fixed(ProtocolId::Limoss)),
    (Contains("stawett"), Brand::Fixed(ProtocolId::Limoss)),
    (Contains("da1458x"), Brand::Fixed(ProtocolId::Octo)),
    (Contains("solace"), Brand::Foreign("solace")),
    (Contains("hhc"), Brand::Foreign("motosleep")),
    (Prefix("bed "), Brand::Fixed(ProtocolId::Linak)),
];

/// Advertised identifiers that are not a descriptor's primary service.
static SECONDARY_SERVICES: &[(Uuid, ProtocolId)] = &[
    (LINAK_POSITION_SERVICE_UUID, ProtocolId::Linak),
    (RICHMAT_FEE9_SERVICE_UUID, ProtocolId::RichmatNordic),
    (FFE0_SERVICE_UUID, ProtocolId::Octo),
];

/// Services also used by families without a descriptor. These can never
/// resolve on their own.
static FOREIGN_CLAIMS: &[Uuid] = &[FFE0_SERVICE_UUID];

fn name_rule(name: &str) -> Option<Brand> {
    let name = name.trim().to_lowercase();
    NAME_RULES
        .iter()
        .find(|(pattern, _)| pattern.matches(&name))
        .map(|(_, brand)| *brand)
}

/// Every family that may advertise `service`, and whether the identifier
/// is shared.
fn service_candidates(service: &Uuid) -> (BTreeSet<ProtocolId>, bool) {
    let mut candidates: BTreeSet<ProtocolId> = all_descriptors()
        .filter(|d| d.service == *service)
        .map(|d| d.id)
        .collect();
    candidates.extend(
        SECONDARY_SERVICES
            .iter()
            .filter(|(uuid, _)| uuid == service)
            .map(|(_, id)| *id),
    );
    let shared = candidates.len() > 1 || FOREIGN_CLAIMS.contains(service);
    (candidates, shared)
}

/// Pick a protocol for a device from its advertised services and name.
pub fn identify(services: &[Uuid], name: Option<&str>) -> Detection {
    if let Some(brand) = name.and_then(name_rule) {
        let detection = brand.resolve(services);
        debug!("Name {:?} resolved to {}", name, detection);
        return detection;
    }

    let mut unique = BTreeSet::new();
    let mut shared: Option<BTreeSet<ProtocolId>> = None;
    for service in services {
        let (candidates, is_shared) = service_candidates(service);
        if candidates.is_empty() {
            continue;
        }
        if !is_shared {
            unique.extend(candidates);
            continue;
        }
        // Narrow across several shared services where they overlap.
        shared = Some(match shared {
            None => candidates,
            Some(prev) => {
                let overlap: BTreeSet<ProtocolId> =
                    prev.intersection(&candidates).copied().collect();
                if overlap.is_empty() {
                    prev.union(&candidates).copied().collect()
                } else {
                    overlap
                }
            }
        });
    }

    let unique: Vec<ProtocolId> = unique.into_iter().collect();
    let detection = match unique.as_slice() {
        [id] => Detection::Protocol(*id),
        [] => match shared {
            Some(candidates) => Detection::Ambiguous(candidates.into_iter().collect()),
            None => Detection::Unknown,
        },
        _ => Detection::Ambiguous(unique),
    };
    debug!("Services {:?} resolved to {}", services, detection);
    detection
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_name_beats_vendor_name() {
        assert_eq!(
            identify(&[], Some("Serta-i 4.0")),
            Detection::Protocol(ProtocolId::Ergomotion)
        );
        assert_eq!(
            identify(&[], Some("Serta Base")),
            Detection::Protocol(ProtocolId::Serta)
        );
        assert_eq!(
            identify(&[], Some("Leggett MlRM 12")),
            Detection::Protocol(ProtocolId::LeggettWilinke)
        );
    }

    #[test]
    fn test_shared_service_needs_name() {
        let services = [OKIN_SERVICE_UUID];
        for _ in 0..10 {
            assert_eq!(
                identify(&services, Some("Nectar 6E21")),
                Detection::Protocol(ProtocolId::Okin7Byte)
            );
        }
        match identify(&services, None) {
            Detection::Ambiguous(candidates) => {
                assert!(candidates.contains(&ProtocolId::OkinUuid));
                assert!(candidates.contains(&ProtocolId::Okin7Byte));
                assert!(candidates.contains(&ProtocolId::LeggettOkin));
            }
            other => panic!("expected ambiguous, got {}", other),
        }
    }

    #[test]
    fn test_brand_variants_follow_services() {
        assert_eq!(
            identify(&[OKIN_SERVICE_UUID], Some("Leggett Base")),
            Detection::Protocol(ProtocolId::LeggettOkin)
        );
        assert_eq!(
            identify(&[LEGGETT_GEN2_SERVICE_UUID], Some("Leggett Base")),
            Detection::Protocol(ProtocolId::LeggettGen2)
        );
        assert_eq!(
            identify(&[WILINKE_SERVICE_UUID], Some("QRRM157052")),
            Detection::Protocol(ProtocolId::RichmatWilinke)
        );
        assert_eq!(
            identify(&[NORDIC_UART_SERVICE_UUID], Some("QRRM157052")),
            Detection::Protocol(ProtocolId::RichmatNordic)
        );
    }

    #[test]
    fn test_unique_services_resolve_alone() {
        assert_eq!(
            identify(&[LINAK_CONTROL_SERVICE_UUID, LINAK_POSITION_SERVICE_UUID], None),
            Detection::Protocol(ProtocolId::Linak)
        );
        assert_eq!(
            identify(&[REVERIE_SERVICE_UUID], None),
            Detection::Protocol(ProtocolId::ReverieNightstand)
        );
        // Octo advertises a shared service next to its own.
        assert_eq!(
            identify(&[FFE0_SERVICE_UUID, OCTO_SERVICE_UUID], None),
            Detection::Protocol(ProtocolId::Octo)
        );
    }

    #[test]
    fn test_shared_and_foreign_services_stay_ambiguous() {
        match identify(&[FFE5_SERVICE_UUID], Some("Unnamed")) {
            Detection::Ambiguous(candidates) => {
                assert!(candidates.contains(&ProtocolId::Keeson));
                assert!(candidates.contains(&ProtocolId::Ergomotion));
            }
            other => panic!("expected ambiguous, got {}", other),
        }
        assert!(matches!(
            identify(&[FFE0_SERVICE_UUID], None),
            Detection::Ambiguous(_)
        ));
    }

    #[test]
    fn test_disjoint_shared_services_union() {
        let Detection::Ambiguous(candidates) =
            identify(&[NORDIC_UART_SERVICE_UUID, FFE5_SERVICE_UUID], None)
        else {
            panic!("expected ambiguous");
        };
        assert!(candidates.contains(&ProtocolId::RichmatNordic));
        assert!(candidates.contains(&ProtocolId::Keeson));
    }

    #[test]
    fn test_unknown_and_foreign() {
        assert_eq!(identify(&[], None), Detection::Unknown);
        assert_eq!(identify(&[Uuid::nil()], Some("Speaker")), Detection::Unknown);
        assert_eq!(
            identify(&[FFE0_SERVICE_UUID], Some("Solace 200")),
            Detection::Unknown
        );
        assert!(matches!(
            identify(&[OKIN_SERVICE_UUID], None).into_result(),
            Err(BedError::AmbiguousProtocol { .. })
        ));
        assert!(matches!(
            Detection::Unknown.into_result(),
            Err(BedError::UnknownProtocol(_))
        ));
    }

    #[test]
    fn test_linak_prefix_only() {
        assert_eq!(
            identify(&[], Some("Bed 1234")),
            Detection::Protocol(ProtocolId::Linak)
        );
        assert_eq!(identify(&[], Some("Sofa bed 1")), Detection::Unknown);
    }
}
