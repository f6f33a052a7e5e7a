//! The kinds of native-image metadata a step can contribute.

use serde::{Deserialize, Serialize};

/// Class-level reflection request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectiveClass {
  pub class_names: Vec<String>,
  pub constructors: bool,
  pub methods: bool,
  pub fields: bool,
  pub final_fields_writable: bool,
  /// Only register when the class is otherwise reachable.
  pub weak: bool,
  pub serialization: bool,
  pub unsafe_allocated: bool,
}

impl ReflectiveClass {
  /// Register `names` with no member access yet.
  pub fn new<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      class_names: names.into_iter().map(Into::into).collect(),
      ..Default::default()
    }
  }

  /// Register `names` for constructors, methods and fields.
  pub fn all<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self::new(names).constructors(true).methods(true).fields(true)
  }

  pub fn constructors(mut self, value: bool) -> Self {
    self.constructors = value;
    self
  }

  pub fn methods(mut self, value: bool) -> Self {
    self.methods = value;
    self
  }

  pub fn fields(mut self, value: bool) -> Self {
    self.fields = value;
    self
  }

  pub fn final_fields_writable(mut self, value: bool) -> Self {
    self.final_fields_writable = value;
    self
  }

  pub fn weak(mut self, value: bool) -> Self {
    self.weak = value;
    self
  }

  pub fn serialization(mut self, value: bool) -> Self {
    self.serialization = value;
    self
  }

  pub fn unsafe_allocated(mut self, value: bool) -> Self {
    self.unsafe_allocated = value;
    self
  }
}

/// One unit of metadata contributed by a step.
///
/// The aggregator merges these into one descriptor per class; the result
/// does not depend on the order contributions arrive in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Contribution {
  ReflectiveClass(ReflectiveClass),

  /// A single method; `<init>` names a constructor.
  ReflectiveMethod {
    class: String,
    name: String,
    params: Vec<String>,
  },

  ReflectiveField { class: String, name: String },

  /// A class and every known subclass or implementor.
  ReflectiveHierarchy { root: String, weak: bool },

  /// Registers the `META-INF/services/<interface>` resource and each
  /// provider for constructor access.
  ServiceProvider {
    interface: String,
    providers: Vec<String>,
  },

  UnsafeAccessedField { class: String, field: String },

  RuntimeInitializedClass(String),

  JniClass {
    class: String,
    constructors: bool,
    methods: bool,
    fields: bool,
  },

  /// One dynamic proxy over an ordered interface list.
  ProxyDefinition(Vec<String>),

  /// Exact resource paths.
  Resource(Vec<String>),

  /// A resource include regex.
  ResourcePattern(String),

  ResourceBundle(String),

  /// A resource exclude regex.
  ExcludedResource(String),

  /// Drop resources from an application-model artifact.
  RemovedResources {
    artifact: String,
    paths: Vec<String>,
  },

  SerializationClass(String),
}

impl Contribution {
  pub fn method(class: impl Into<String>, name: impl Into<String>, params: &[&str]) -> Self {
    Contribution::ReflectiveMethod {
      class: class.into(),
      name: name.into(),
      params: params.iter().map(|p| p.to_string()).collect(),
    }
  }

  pub fn field(class: impl Into<String>, name: impl Into<String>) -> Self {
    Contribution::ReflectiveField {
      class: class.into(),
      name: name.into(),
    }
  }

  pub fn service_provider<I, S>(interface: impl Into<String>, providers: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Contribution::ServiceProvider {
      interface: interface.into(),
      providers: providers.into_iter().map(Into::into).collect(),
    }
  }

  pub fn proxy<I, S>(interfaces: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Contribution::ProxyDefinition(interfaces.into_iter().map(Into::into).collect())
  }

  /// Short label for logs.
  pub fn kind(&self) -> &'static str {
    match self {
      Contribution::ReflectiveClass(_) => "reflective-class",
      Contribution::ReflectiveMethod { .. } => "reflective-method",
      Contribution::ReflectiveField { .. } => "reflective-field",
      Contribution::ReflectiveHierarchy { .. } => "reflective-hierarchy",
      Contribution::ServiceProvider { .. } => "service-provider",
      Contribution::UnsafeAccessedField { .. } => "unsafe-field",
      Contribution::RuntimeInitializedClass(_) => "runtime-initialized",
      Contribution::JniClass { .. } => "jni",
      Contribution::ProxyDefinition(_) => "proxy",
      Contribution::Resource(_) => "resource",
      Contribution::ResourcePattern(_) => "resource-pattern",
      Contribution::ResourceBundle(_) => "resource-bundle",
      Contribution::ExcludedResource(_) => "excluded-resource",
      Contribution::RemovedResources { .. } => "removed-resources",
      Contribution::SerializationClass(_) => "serialization",
    }
  }
}
