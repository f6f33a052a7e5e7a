//! Naming conventions shared by generated artifacts.

/// Package that recorder classes are generated into.
pub const STEPS_PACKAGE: &str = "io.quarkus.deployment.steps";

/// The generated application entry point.
pub const APPLICATION_CLASS: &str = "io.quarkus.runner.ApplicationImpl";

/// Directory that native-image configuration files are written to.
pub const NATIVE_IMAGE_DIR: &str = "META-INF/native-image";

/// Prefix of service-provider descriptor resources.
pub const SERVICES_DIR: &str = "META-INF/services/";

pub const ENV_PARALLELISM: &str = "PREBAKE_PARALLELISM";
pub const ENV_GRAPH_OUTPUT: &str = "PREBAKE_GRAPH_OUTPUT";
pub const ENV_LOG_CONFLICT_CAUSE: &str = "PREBAKE_LOG_CONFLICT_CAUSE";

/// Annotation that requests reflective access to a class.
pub const REGISTER_FOR_REFLECTION: &str = "io.quarkus.runtime.annotations.RegisterForReflection";

pub const BANNER_ENABLED: &str = "quarkus.banner.enabled";
pub const BANNER_PATH: &str = "quarkus.banner.path";

/// Comma-separated resource include patterns.
pub const NATIVE_RESOURCES_INCLUDES: &str = "quarkus.native.resources.includes";
pub const NATIVE_RESOURCES_EXCLUDES: &str = "quarkus.native.resources.excludes";
pub const NATIVE_RUNTIME_INITIALIZED: &str = "quarkus.native.runtime-initialized-classes";
