// src/consumer/mod.rs

//! The Kafka consumer host as an ordered resource list
//!
//! [`desired_state`] expands a [`ConsumerConfig`] into the resources that
//! make up a running console consumer, declared in dependency order:
//!
//! ```text
//! group -> user -> directories -> archive -> symlink -> config dir
//!       -> consumer.properties -> unit file -> running service
//! ```

mod template;

pub use template::{
    CONSOLE_CONSUMER, MANAGED_HEADER, property_key, render_properties, render_unit,
};

use crate::config::{ConsumerConfig, OsFamily};
use crate::resource::{
    ArchiveSpec, DesiredState, DirectorySpec, FileSpec, GroupSpec, ServiceSpec, ServiceUnitSpec,
    SymlinkSpec, UserSpec,
};
use std::path::PathBuf;

const DIRECTORY_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

/// Leading archive path components dropped on extraction (`kafka_<version>/`)
const ARCHIVE_STRIP_COMPONENTS: usize = 1;

/// Expand `config` into the ordered list of resources to converge
pub fn desired_state(config: &ConsumerConfig, os: OsFamily) -> Vec<DesiredState> {
    let shell = config
        .user_shell
        .clone()
        .unwrap_or_else(|| os.nologin_shell().to_string());
    let install_root = config.install_root();

    let directory = |path: PathBuf| {
        DesiredState::Directory(DirectorySpec {
            path,
            owner: config.user.clone(),
            group: config.group.clone(),
            mode: DIRECTORY_MODE,
        })
    };

    let properties = FileSpec {
        path: config.properties_path(),
        content: render_properties(&config.service_config).into_bytes(),
        owner: config.user.clone(),
        group: config.group.clone(),
        mode: FILE_MODE,
    };
    let unit = ServiceUnitSpec {
        name: config.service_name.clone(),
        file: FileSpec {
            path: config.unit_path(),
            content: render_unit(config).into_bytes(),
            owner: "root".to_string(),
            group: "root".to_string(),
            mode: FILE_MODE,
        },
    };

    let mut resources = vec![
        DesiredState::Group(GroupSpec {
            name: config.group.clone(),
            system: true,
        }),
        DesiredState::User(UserSpec {
            name: config.user.clone(),
            group: config.group.clone(),
            shell,
            home: config.link_path(),
            system: true,
        }),
        directory(config.package_dir.clone()),
        directory(config.log_dir.clone()),
        directory(install_root.clone()),
        DesiredState::ArchiveExtraction(ArchiveSpec {
            source: config.archive_path(),
            dest: install_root.clone(),
            creates: install_root.join(CONSOLE_CONSUMER),
            strip_components: ARCHIVE_STRIP_COMPONENTS,
            owner: config.user.clone(),
            group: config.group.clone(),
        }),
        DesiredState::Symlink(SymlinkSpec {
            path: config.link_path(),
            target: install_root,
        }),
        directory(config.config_dir.clone()),
    ];

    let subscribes = vec![
        DesiredState::TemplatedFile(properties.clone()).id(),
        DesiredState::ServiceUnit(unit.clone()).id(),
    ];
    resources.push(DesiredState::TemplatedFile(properties));
    resources.push(DesiredState::ServiceUnit(unit));

    if config.service_ensure_running {
        resources.push(DesiredState::ServiceRunning(ServiceSpec {
            name: config.service_name.clone(),
            enable: true,
            subscribes,
        }));
    }

    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use crate::runner::validate_order;
    use std::path::Path;

    fn demo_config() -> ConsumerConfig {
        let mut config = ConsumerConfig::default();
        config
            .service_config
            .insert("topic".to_string(), "demo".to_string());
        config
            .service_config
            .insert("bootstrap-server".to_string(), "localhost:9092".to_string());
        config
    }

    #[test]
    fn test_resource_order() {
        let resources = desired_state(&demo_config(), OsFamily::Debian);
        let ids: Vec<String> = resources.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "group:kafka",
                "user:kafka",
                "directory:/var/tmp/kafka",
                "directory:/var/log/kafka",
                "directory:/opt/kafka-2.12-2.4.1",
                "archive:/opt/kafka-2.12-2.4.1",
                "symlink:/opt/kafka",
                "directory:/opt/kafka/config",
                "file:/opt/kafka/config/consumer.properties",
                "unit:/etc/systemd/system/kafka-consumer.service",
                "service:kafka-consumer",
            ]
        );
        assert_eq!(validate_order(&resources), Ok(()));
    }

    #[test]
    fn test_user_shell_follows_platform() {
        let shell = |os: OsFamily| match &desired_state(&demo_config(), os)[1] {
            DesiredState::User(user) => user.shell.clone(),
            other => panic!("expected user, got {:?}", other),
        };
        assert_eq!(shell(OsFamily::Debian), "/usr/sbin/nologin");
        assert_eq!(shell(OsFamily::RedHat), "/sbin/nologin");

        let mut config = demo_config();
        config.user_shell = Some("/bin/false".to_string());
        let resources = desired_state(&config, OsFamily::Suse);
        let DesiredState::User(user) = &resources[1] else {
            panic!("expected user");
        };
        assert_eq!(user.shell, "/bin/false");
    }

    #[test]
    fn test_files_and_ownership() {
        let resources = desired_state(&demo_config(), OsFamily::Debian);
        let Some(DesiredState::TemplatedFile(properties)) = resources
            .iter()
            .find(|r| r.kind() == ResourceKind::File)
        else {
            panic!("missing properties file");
        };
        assert_eq!((properties.owner.as_str(), properties.group.as_str()), ("kafka", "kafka"));
        let content = String::from_utf8(properties.content.clone()).unwrap();
        assert!(content.contains("topic=demo\n"));
        assert!(content.contains("bootstrap.server=localhost:9092\n"));

        let Some(DesiredState::ServiceUnit(unit)) = resources
            .iter()
            .find(|r| r.kind() == ResourceKind::ServiceUnit)
        else {
            panic!("missing unit");
        };
        assert_eq!((unit.file.owner.as_str(), unit.file.group.as_str()), ("root", "root"));
        assert_eq!(unit.file.mode, 0o644);
    }

    #[test]
    fn test_custom_config_dir() {
        let mut config = demo_config();
        config.config_dir = PathBuf::from("/opt/kafka/custom_config");
        let resources = desired_state(&config, OsFamily::RedHat);

        assert!(resources.iter().any(|r| r.path()
            == Some(Path::new("/opt/kafka/custom_config/consumer.properties"))));
        assert!(resources.iter().any(|r| r.path() == Some(Path::new("/opt/kafka/custom_config"))));
        assert_eq!(validate_order(&resources), Ok(()));
    }

    #[test]
    fn test_service_subscribes_to_rendered_files() {
        let resources = desired_state(&demo_config(), OsFamily::Debian);
        let Some(DesiredState::ServiceRunning(service)) = resources.last() else {
            panic!("service must come last");
        };
        let subscribed: Vec<String> = service.subscribes.iter().map(ToString::to_string).collect();
        assert_eq!(
            subscribed,
            vec![
                "file:/opt/kafka/config/consumer.properties",
                "unit:/etc/systemd/system/kafka-consumer.service",
            ]
        );
    }

    #[test]
    fn test_service_can_be_left_alone() {
        let mut config = demo_config();
        config.service_ensure_running = false;
        let resources = desired_state(&config, OsFamily::Debian);
        assert!(resources.iter().all(|r| r.kind() != ResourceKind::Service));
    }
}
