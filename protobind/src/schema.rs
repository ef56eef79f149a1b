//! # Schema Resolution
//!
//! Turns a schema reference (file path, package name and service name) into a
//! [`ResolvedService`]: a validated `ServiceDescriptor` plus the loader options that
//! govern how its messages are represented.
//!
//! Loading is delegated to a [`SchemaLoader`]. Two loaders are provided:
//!
//! * [`ProtoFileLoader`]: compiles `.proto` sources at runtime with `protox`.
//! * [`FileDescriptorSetLoader`]: decodes a pre-built binary `FileDescriptorSet`
//!   (e.g. the output of `protoc --descriptor_set_out`).
//!
//! Every name is checked eagerly, so an invalid package, service or method is
//! reported while bootstrapping instead of at the first call.
use crate::options::LoaderOptions;
use prost_reflect::{DescriptorError, DescriptorPool, MethodDescriptor, ServiceDescriptor};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SchemaResolutionError {
    #[error("Failed to compile schema '{path}': '{source}'")]
    Compile {
        path: PathBuf,
        #[source]
        source: Box<protox::Error>,
    },
    #[error("Failed to read schema '{path}': '{source}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to decode file descriptor set '{path}': '{source}'")]
    Decode {
        path: PathBuf,
        #[source]
        source: DescriptorError,
    },
    #[error("Package '{package}' not found in schema '{path}'")]
    PackageNotFound { package: String, path: PathBuf },
    #[error("Service '{service}' not found in package '{package}'")]
    ServiceNotFound { service: String, package: String },
    #[error("Method '{method}' not found in service '{service}'")]
    MethodNotFound { method: String, service: String },
    #[error("Service '{service}' is registered more than once")]
    DuplicateService { service: String },
    #[error("Method '{method}' of service '{service}' is a streaming method, only unary methods are supported")]
    StreamingNotSupported { method: String, service: String },
}

/// Loads a schema document into a descriptor pool.
pub trait SchemaLoader {
    fn load(&self, path: &Path) -> Result<DescriptorPool, SchemaResolutionError>;
}

impl<T: SchemaLoader + ?Sized> SchemaLoader for &T {
    fn load(&self, path: &Path) -> Result<DescriptorPool, SchemaResolutionError> {
        (**self).load(path)
    }
}

/// Compiles `.proto` files with `protox`.
///
/// The directory containing the requested file is always searched for imports,
/// after any explicitly configured include path.
#[derive(Debug, Clone, Default)]
pub struct ProtoFileLoader {
    include_paths: Vec<PathBuf>,
}

impl ProtoFileLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directory to search for the file and its imports.
    pub fn include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }
}

impl SchemaLoader for ProtoFileLoader {
    fn load(&self, path: &Path) -> Result<DescriptorPool, SchemaResolutionError> {
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let includes = self
            .include_paths
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(parent));

        let compile_error = |source| SchemaResolutionError::Compile {
            path: path.to_path_buf(),
            source: Box::new(source),
        };

        let mut compiler = protox::Compiler::new(includes).map_err(compile_error)?;
        compiler.include_imports(true);
        compiler.open_file(path).map_err(compile_error)?;

        Ok(compiler.descriptor_pool())
    }
}

/// Decodes binary `FileDescriptorSet` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDescriptorSetLoader;

impl SchemaLoader for FileDescriptorSetLoader {
    fn load(&self, path: &Path) -> Result<DescriptorPool, SchemaResolutionError> {
        let bytes = std::fs::read(path).map_err(|source| SchemaResolutionError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        DescriptorPool::decode(bytes.as_slice()).map_err(|source| SchemaResolutionError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Identifies exactly one service within a schema document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaReference {
    pub path: PathBuf,
    pub package_name: String,
    pub service_name: String,
}

impl SchemaReference {
    pub fn new(
        path: impl Into<PathBuf>,
        package_name: impl Into<String>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            package_name: package_name.into(),
            service_name: service_name.into(),
        }
    }

    /// The fully qualified service name (e.g. `orders.OrderService`).
    pub fn full_service_name(&self) -> String {
        if self.package_name.is_empty() {
            self.service_name.clone()
        } else {
            format!("{}.{}", self.package_name, self.service_name)
        }
    }

    /// Loads the schema and looks up the referenced service.
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedService)` - The package and service exist in the schema.
    /// * `Err(SchemaResolutionError)` - The schema can't be loaded or a name is missing.
    pub fn resolve(
        &self,
        loader: &impl SchemaLoader,
        options: LoaderOptions,
    ) -> Result<ResolvedService, SchemaResolutionError> {
        let pool = loader.load(&self.path)?;

        if !pool.files().any(|file| file.package_name() == self.package_name) {
            return Err(SchemaResolutionError::PackageNotFound {
                package: self.package_name.clone(),
                path: self.path.clone(),
            });
        }

        let descriptor = pool
            .get_service_by_name(&self.full_service_name())
            .ok_or_else(|| SchemaResolutionError::ServiceNotFound {
                service: self.service_name.clone(),
                package: self.package_name.clone(),
            })?;

        tracing::debug!(
            service = descriptor.full_name(),
            path = %self.path.display(),
            "resolved service"
        );

        Ok(ResolvedService {
            descriptor,
            options,
        })
    }
}

/// A service descriptor validated against its schema.
#[derive(Debug, Clone)]
pub struct ResolvedService {
    descriptor: ServiceDescriptor,
    options: LoaderOptions,
}

impl ResolvedService {
    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn options(&self) -> LoaderOptions {
        self.options
    }

    /// The fully qualified service name (e.g. `orders.OrderService`).
    pub fn full_name(&self) -> &str {
        self.descriptor.full_name()
    }

    /// The pool the service was resolved from.
    pub fn pool(&self) -> &DescriptorPool {
        self.descriptor.parent_pool()
    }

    /// Looks up a unary method by name.
    ///
    /// # Returns
    ///
    /// * `Ok(MethodDescriptor)` - The method exists and is unary.
    /// * `Err(SchemaResolutionError)` - The method is missing or streams.
    pub fn unary_method(&self, name: &str) -> Result<MethodDescriptor, SchemaResolutionError> {
        let method = self
            .descriptor
            .methods()
            .find(|m| m.name() == name)
            .ok_or_else(|| SchemaResolutionError::MethodNotFound {
                method: name.to_string(),
                service: self.full_name().to_string(),
            })?;

        if method.is_client_streaming() || method.is_server_streaming() {
            return Err(SchemaResolutionError::StreamingNotSupported {
                method: name.to_string(),
                service: self.full_name().to_string(),
            });
        }

        Ok(method)
    }
}
