//! Composition root for operations: one pipeline per operation type, built
//! once and dispatched by type.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::application::auth::{
    GetCurrentUser, Login, RegisterAdmin, RegisterUser,
    commands::{LoginHandler, RegisterHandler},
    queries::GetCurrentUserHandler,
    validators::{LoginValidator, RegistrationValidator},
};
use crate::application::books::{
    BookEffects, CreateBook, DeleteBook, GetAllBooks, GetBookById, PublishFailurePolicy,
    UpdateBook, UploadBookCover,
    commands::{CreateBookHandler, DeleteBookHandler, UpdateBookHandler, UploadBookCoverHandler},
    queries::{GetAllBooksHandler, GetBookByIdHandler},
    validators::{CreateBookValidator, UpdateBookValidator, UploadBookCoverValidator},
};
use crate::application::error::AppError;
use crate::application::pipeline::{
    CacheStage, Cacheable, Handler, LoggingStage, Operation, OperationContext, Pipeline,
    PipelineBuilder, ValidationStage, ValidatorRegistry,
};
use crate::application::ports::{
    BlobStorage, MessagePublisher, PasswordHasher, TelemetrySink, TokenIssuer,
};
use crate::application::repos::{BooksRepo, UsersRepo};
use crate::cache::ResilientCache;
use crate::util::clock::Clock;

/// Tunables for the standard stages and handlers.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub slow_operation_threshold: Duration,
    pub default_cache_ttl: Duration,
    pub on_publish_failure: PublishFailurePolicy,
    pub max_cover_bytes: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            slow_operation_threshold: crate::application::pipeline::logging::DEFAULT_SLOW_THRESHOLD,
            default_cache_ttl: Duration::from_secs(300),
            on_publish_failure: PublishFailurePolicy::Fail,
            max_cover_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Collaborators every handler draws from.
#[derive(Clone)]
pub struct CatalogDeps {
    pub books: Arc<dyn BooksRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub cache: ResilientCache,
    pub publisher: Arc<dyn MessagePublisher>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub blobs: Arc<dyn BlobStorage>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub clock: Arc<dyn Clock>,
}

/// Builds pipelines with the standard stage order.
struct Composer<'a> {
    settings: &'a CatalogSettings,
    validators: &'a ValidatorRegistry,
    cache: &'a ResilientCache,
}

impl Composer<'_> {
    /// Logging → Validation → Handler.
    fn command<O: Operation>(&self, handler: Arc<dyn Handler<O>>) -> Pipeline<O> {
        PipelineBuilder::new()
            .stage(LoggingStage::new(self.settings.slow_operation_threshold))
            .stage(ValidationStage::<O>::from_registry(self.validators))
            .shared_handler(handler)
    }

    /// Logging → Validation → Cache → Handler.
    fn query<O>(&self, handler: Arc<dyn Handler<O>>) -> Pipeline<O>
    where
        O: Cacheable,
        O::Output: DeserializeOwned,
    {
        PipelineBuilder::new()
            .stage(LoggingStage::new(self.settings.slow_operation_threshold))
            .stage(ValidationStage::<O>::from_registry(self.validators))
            .stage(CacheStage::new(
                self.cache.clone(),
                self.settings.default_cache_ttl,
            ))
            .shared_handler(handler)
    }
}

pub struct Catalog {
    get_all_books: Pipeline<GetAllBooks>,
    get_book_by_id: Pipeline<GetBookById>,
    create_book: Pipeline<CreateBook>,
    update_book: Pipeline<UpdateBook>,
    delete_book: Pipeline<DeleteBook>,
    upload_book_cover: Pipeline<UploadBookCover>,
    register_user: Pipeline<RegisterUser>,
    register_admin: Pipeline<RegisterAdmin>,
    login: Pipeline<Login>,
    get_current_user: Pipeline<GetCurrentUser>,
}

/// Resolves the pipeline registered for an operation type.
pub trait Route<O: Operation> {
    fn pipeline(&self) -> &Pipeline<O>;
}

macro_rules! routes {
    ($($op:ty => $field:ident),+ $(,)?) => {
        $(
            impl Route<$op> for Catalog {
                fn pipeline(&self) -> &Pipeline<$op> {
                    &self.$field
                }
            }
        )+
    };
}

routes! {
    GetAllBooks => get_all_books,
    GetBookById => get_book_by_id,
    CreateBook => create_book,
    UpdateBook => update_book,
    DeleteBook => delete_book,
    UploadBookCover => upload_book_cover,
    RegisterUser => register_user,
    RegisterAdmin => register_admin,
    Login => login,
    GetCurrentUser => get_current_user,
}

impl Catalog {
    pub fn new(deps: CatalogDeps, settings: CatalogSettings) -> Self {
        let validators = default_validators(&deps, &settings);
        let composer = Composer {
            settings: &settings,
            validators: &validators,
            cache: &deps.cache,
        };
        let effects = BookEffects::new(
            deps.cache.clone(),
            Arc::clone(&deps.publisher),
            Arc::clone(&deps.telemetry),
            settings.on_publish_failure,
        );
        let register = Arc::new(RegisterHandler::new(
            Arc::clone(&deps.users),
            Arc::clone(&deps.hasher),
            Arc::clone(&deps.clock),
        ));

        Self {
            get_all_books: composer.query::<GetAllBooks>(Arc::new(GetAllBooksHandler::new(Arc::clone(
                &deps.books,
            )))),
            get_book_by_id: composer.query::<GetBookById>(Arc::new(GetBookByIdHandler::new(Arc::clone(
                &deps.books,
            )))),
            create_book: composer.command::<CreateBook>(Arc::new(CreateBookHandler::new(
                Arc::clone(&deps.books),
                effects.clone(),
                Arc::clone(&deps.clock),
            ))),
            update_book: composer.command::<UpdateBook>(Arc::new(UpdateBookHandler::new(
                Arc::clone(&deps.books),
                effects.clone(),
                Arc::clone(&deps.clock),
            ))),
            delete_book: composer.command::<DeleteBook>(Arc::new(DeleteBookHandler::new(
                Arc::clone(&deps.books),
                effects.clone(),
                Arc::clone(&deps.clock),
            ))),
            upload_book_cover: composer.command::<UploadBookCover>(Arc::new(UploadBookCoverHandler::new(
                Arc::clone(&deps.books),
                Arc::clone(&deps.blobs),
                effects,
                Arc::clone(&deps.clock),
            ))),
            register_user: composer.command::<RegisterUser>(register.clone()),
            register_admin: composer.command::<RegisterAdmin>(register),
            login: composer.command::<Login>(Arc::new(LoginHandler::new(
                Arc::clone(&deps.users),
                Arc::clone(&deps.hasher),
                Arc::clone(&deps.tokens),
            ))),
            get_current_user: composer.command::<GetCurrentUser>(Arc::new(GetCurrentUserHandler::new(
                Arc::clone(&deps.users),
            ))),
        }
    }

    /// Run `op` through its pipeline.
    pub async fn send<O>(&self, op: &O, ctx: &OperationContext) -> Result<O::Output, AppError>
    where
        O: Operation,
        Self: Route<O>,
    {
        Route::<O>::pipeline(self).send(op, ctx).await
    }

    pub fn route<O>(&self) -> &Pipeline<O>
    where
        O: Operation,
        Self: Route<O>,
    {
        Route::<O>::pipeline(self)
    }
}

fn default_validators(deps: &CatalogDeps, settings: &CatalogSettings) -> ValidatorRegistry {
    let mut registry = ValidatorRegistry::new();
    registry
        .register::<CreateBook>(CreateBookValidator::new(Arc::clone(&deps.clock)))
        .register::<UpdateBook>(UpdateBookValidator::new(Arc::clone(&deps.clock)))
        .register::<UploadBookCover>(UploadBookCoverValidator::new(settings.max_cover_bytes))
        .register::<RegisterUser>(RegistrationValidator)
        .register::<RegisterAdmin>(RegistrationValidator)
        .register::<Login>(LoginValidator);
    registry
}
