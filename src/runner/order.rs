// src/runner/order.rs

//! Dependency order validation
//!
//! The runner executes resources exactly in the order they are declared.
//! Before anything is probed, the declared order is checked against the
//! dependencies implied by the resources themselves.

use crate::resource::{DesiredState, ResourceId};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// A declared order that would converge something before its dependency
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("resource {0} is declared more than once")]
    DuplicateResource(ResourceId),

    #[error("{resource} is declared before {dependency} it depends on")]
    OutOfOrder {
        resource: ResourceId,
        dependency: ResourceId,
    },

    #[error("{service} subscribes to {missing}, which is not declared")]
    UnknownSubscription {
        service: ResourceId,
        missing: ResourceId,
    },
}

/// Check that every resource follows everything it depends on
pub fn validate_order(resources: &[DesiredState]) -> Result<(), PlanError> {
    let mut positions: HashMap<ResourceId, usize> = HashMap::new();
    for (index, desired) in resources.iter().enumerate() {
        let id = desired.id();
        if positions.insert(id.clone(), index).is_some() {
            return Err(PlanError::DuplicateResource(id));
        }
    }

    let group_ids: HashMap<&str, ResourceId> = resources
        .iter()
        .filter_map(|d| match d {
            DesiredState::Group(g) => Some((g.name.as_str(), d.id())),
            _ => None,
        })
        .collect();
    let user_ids: HashMap<&str, ResourceId> = resources
        .iter()
        .filter_map(|d| match d {
            DesiredState::User(u) => Some((u.name.as_str(), d.id())),
            _ => None,
        })
        .collect();
    let directory_providers: Vec<(PathBuf, ResourceId)> = resources
        .iter()
        .filter(|d| d.provides_directory())
        .filter_map(|d| d.path().map(|p| (p.to_path_buf(), d.id())))
        .collect();
    let file_like: Vec<ResourceId> = resources
        .iter()
        .filter(|d| d.is_file_like())
        .map(DesiredState::id)
        .collect();

    for (index, desired) in resources.iter().enumerate() {
        let id = desired.id();
        let mut dependencies: Vec<ResourceId> = Vec::new();

        if let DesiredState::User(user) = desired
            && let Some(group) = group_ids.get(user.group.as_str())
        {
            dependencies.push(group.clone());
        }

        if let Some((owner, group)) = desired.ownership() {
            dependencies.extend(user_ids.get(owner).cloned());
            dependencies.extend(group_ids.get(group).cloned());
        }

        if let Some(path) = desired.path() {
            dependencies.extend(
                directory_providers
                    .iter()
                    .filter(|(dir, _)| path != dir.as_path() && path.starts_with(dir))
                    .map(|(_, provider)| provider.clone()),
            );
        }

        // An extraction unpacks into a directory declared at its destination
        if let DesiredState::ArchiveExtraction(archive) = desired {
            dependencies.extend(
                resources
                    .iter()
                    .filter(|d| matches!(d, DesiredState::Directory(dir) if dir.path == archive.dest))
                    .map(DesiredState::id),
            );
        }

        if let DesiredState::ServiceRunning(service) = desired {
            dependencies.extend(file_like.iter().cloned());
            for subscribed in &service.subscribes {
                if !positions.contains_key(subscribed) {
                    return Err(PlanError::UnknownSubscription {
                        service: id,
                        missing: subscribed.clone(),
                    });
                }
                dependencies.push(subscribed.clone());
            }
        }

        for dependency in dependencies {
            if positions[&dependency] > index {
                return Err(PlanError::OutOfOrder {
                    resource: id,
                    dependency,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{
        ArchiveSpec, DirectorySpec, FileSpec, GroupSpec, ResourceKind, ServiceSpec, SymlinkSpec,
        UserSpec,
    };

    fn group() -> DesiredState {
        DesiredState::Group(GroupSpec {
            name: "kafka".to_string(),
            system: true,
        })
    }

    fn user() -> DesiredState {
        DesiredState::User(UserSpec {
            name: "kafka".to_string(),
            group: "kafka".to_string(),
            shell: "/sbin/nologin".to_string(),
            home: PathBuf::from("/opt/kafka"),
            system: true,
        })
    }

    fn directory(path: &str) -> DesiredState {
        DesiredState::Directory(DirectorySpec {
            path: PathBuf::from(path),
            owner: "kafka".to_string(),
            group: "kafka".to_string(),
            mode: 0o755,
        })
    }

    fn file(path: &str) -> DesiredState {
        DesiredState::TemplatedFile(FileSpec {
            path: PathBuf::from(path),
            content: Vec::new(),
            owner: "kafka".to_string(),
            group: "kafka".to_string(),
            mode: 0o644,
        })
    }

    fn service(subscribes: Vec<ResourceId>) -> DesiredState {
        DesiredState::ServiceRunning(ServiceSpec {
            name: "kafka-consumer".to_string(),
            enable: true,
            subscribes,
        })
    }

    #[test]
    fn test_valid_order() {
        let conf = file("/var/log/kafka/app.conf");
        let conf_id = conf.id();
        let resources = vec![
            group(),
            user(),
            directory("/var/log/kafka"),
            conf,
            service(vec![conf_id]),
        ];
        assert_eq!(validate_order(&resources), Ok(()));
    }

    #[test]
    fn test_user_before_group_rejected() {
        let err = validate_order(&[user(), group()]).unwrap_err();
        assert_eq!(
            err,
            PlanError::OutOfOrder {
                resource: user().id(),
                dependency: group().id(),
            }
        );
    }

    #[test]
    fn test_owned_directory_before_user_rejected() {
        let err = validate_order(&[group(), directory("/var/log/kafka"), user()]).unwrap_err();
        assert!(matches!(err, PlanError::OutOfOrder { dependency, .. } if dependency == user().id()));
    }

    #[test]
    fn test_file_before_directory_rejected() {
        let err = validate_order(&[
            group(),
            user(),
            file("/var/log/kafka/app.conf"),
            directory("/var/log/kafka"),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "file:/var/log/kafka/app.conf is declared before directory:/var/log/kafka it depends on"
        );
    }

    #[test]
    fn test_symlink_counts_as_parent_directory() {
        let link = DesiredState::Symlink(SymlinkSpec {
            path: PathBuf::from("/opt/kafka"),
            target: PathBuf::from("/opt/kafka-2.12-2.4.1"),
        });
        let err = validate_order(&[group(), user(), directory("/opt/kafka/config"), link])
            .unwrap_err();
        assert!(matches!(err, PlanError::OutOfOrder { .. }));
    }

    #[test]
    fn test_service_before_file_rejected() {
        let err = validate_order(&[group(), user(), service(Vec::new()), file("/etc/app.conf")])
            .unwrap_err();
        assert!(matches!(err, PlanError::OutOfOrder { resource, .. } if resource.kind == ResourceKind::Service));
    }

    #[test]
    fn test_duplicates_and_unknown_subscriptions() {
        assert_eq!(
            validate_order(&[group(), group()]),
            Err(PlanError::DuplicateResource(group().id()))
        );

        let missing = ResourceId::new(ResourceKind::File, "/etc/nowhere");
        assert!(matches!(
            validate_order(&[service(vec![missing])]),
            Err(PlanError::UnknownSubscription { .. })
        ));
    }

    #[test]
    fn test_archive_follows_its_destination() {
        let archive = DesiredState::ArchiveExtraction(ArchiveSpec {
            source: PathBuf::from("/var/tmp/kafka/kafka_2.12-2.4.1.tgz"),
            dest: PathBuf::from("/opt/kafka-2.12-2.4.1"),
            creates: PathBuf::from("/opt/kafka-2.12-2.4.1/bin/kafka-console-consumer.sh"),
            strip_components: 1,
            owner: "kafka".to_string(),
            group: "kafka".to_string(),
        });
        let dest = directory("/opt/kafka-2.12-2.4.1");

        assert!(validate_order(&[group(), user(), dest.clone(), archive.clone()]).is_ok());
        assert!(validate_order(&[group(), user(), archive, dest]).is_err());
    }
}
