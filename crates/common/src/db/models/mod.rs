//! SeaORM entity models
//!
//! Database entities for the Srcent content store

mod analysis;
mod product;
mod source_article;
mod subscriber;

pub use analysis::{AiAnalysis, Alternative, Faq, Feature, UseCase};

pub use product::{
    Entity as ProductEntity,
    Model as Product,
    ActiveModel as ProductActiveModel,
    Column as ProductColumn,
    ProductStatus,
};

pub use source_article::{
    Entity as SourceArticleEntity,
    Model as SourceArticle,
    ActiveModel as SourceArticleActiveModel,
    Column as SourceArticleColumn,
};

pub use subscriber::{
    Entity as SubscriberEntity,
    Model as Subscriber,
    ActiveModel as SubscriberActiveModel,
    Column as SubscriberColumn,
    SubscriberStatus,
};
