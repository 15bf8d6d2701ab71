//! Which resource properties hold local artifact references.
//!
//! A closed table keyed by the resource `Type`. Supporting another resource
//! type means adding one entry to [`ARTIFACT_TABLE`].

/// What a referenced path contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Uploaded as-is; directories are zipped. With `force_zip`, a plain file
    /// that is not already a zip archive is zipped too.
    Artifact { force_zip: bool },
    /// A nested template, exported before it is uploaded.
    Template,
}

/// How the uploaded object is written back into the property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorStyle {
    /// `s3://bucket/key`
    S3Uri,
    /// `<url base>/bucket/key`
    PathStyleUrl,
    /// `{ <bucket_field>: bucket, <key_field>: key }`
    ObjectFields {
        bucket_field: &'static str,
        key_field: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactField {
    /// Property name under `Properties`; nested properties use `.` (`Command.ScriptLocation`).
    pub property: &'static str,
    pub kind: ArtifactKind,
    pub locator: LocatorStyle,
    /// Package the template's own directory when the property is absent.
    pub package_missing: bool,
}

impl ArtifactField {
    const fn new(property: &'static str, kind: ArtifactKind, locator: LocatorStyle) -> Self {
        Self {
            property,
            kind,
            locator,
            package_missing: false,
        }
    }

    const fn or_current_dir(mut self) -> Self {
        self.package_missing = true;
        self
    }

    pub fn path(&self) -> impl Iterator<Item = &'static str> {
        self.property.split('.')
    }
}

const FILE: ArtifactKind = ArtifactKind::Artifact { force_zip: false };
const ZIP: ArtifactKind = ArtifactKind::Artifact { force_zip: true };
const TEMPLATE: ArtifactKind = ArtifactKind::Template;

const S3_OBJECT: LocatorStyle = LocatorStyle::ObjectFields {
    bucket_field: "S3Bucket",
    key_field: "S3Key",
};
const BUCKET_KEY: LocatorStyle = LocatorStyle::ObjectFields {
    bucket_field: "Bucket",
    key_field: "Key",
};

/// Serverless functions with inline code have nothing to package.
pub const INLINE_CODE_PROPERTY: &str = "InlineCode";

static ARTIFACT_TABLE: &[(&str, &[ArtifactField])] = &[
    (
        "AWS::Serverless::Function",
        &[ArtifactField::new("CodeUri", ZIP, LocatorStyle::S3Uri).or_current_dir()],
    ),
    (
        "AWS::Serverless::Api",
        &[ArtifactField::new("DefinitionUri", FILE, LocatorStyle::S3Uri)],
    ),
    (
        "AWS::Serverless::HttpApi",
        &[ArtifactField::new("DefinitionUri", FILE, LocatorStyle::S3Uri)],
    ),
    (
        "AWS::Serverless::StateMachine",
        &[ArtifactField::new("DefinitionUri", FILE, LocatorStyle::S3Uri)],
    ),
    (
        "AWS::Serverless::LayerVersion",
        &[ArtifactField::new("ContentUri", ZIP, LocatorStyle::S3Uri).or_current_dir()],
    ),
    (
        "AWS::Serverless::Application",
        &[ArtifactField::new("Location", TEMPLATE, LocatorStyle::PathStyleUrl)],
    ),
    (
        "AWS::AppSync::GraphQLSchema",
        &[ArtifactField::new("DefinitionS3Location", FILE, LocatorStyle::S3Uri)],
    ),
    (
        "AWS::AppSync::Resolver",
        &[
            ArtifactField::new("RequestMappingTemplateS3Location", FILE, LocatorStyle::S3Uri),
            ArtifactField::new("ResponseMappingTemplateS3Location", FILE, LocatorStyle::S3Uri),
        ],
    ),
    (
        "AWS::AppSync::FunctionConfiguration",
        &[
            ArtifactField::new("RequestMappingTemplateS3Location", FILE, LocatorStyle::S3Uri),
            ArtifactField::new("ResponseMappingTemplateS3Location", FILE, LocatorStyle::S3Uri),
        ],
    ),
    (
        "AWS::Lambda::Function",
        &[ArtifactField::new("Code", ZIP, S3_OBJECT).or_current_dir()],
    ),
    (
        "AWS::Lambda::LayerVersion",
        &[ArtifactField::new("Content", ZIP, S3_OBJECT).or_current_dir()],
    ),
    (
        "AWS::ApiGateway::RestApi",
        &[ArtifactField::new("BodyS3Location", FILE, BUCKET_KEY)],
    ),
    (
        "AWS::StepFunctions::StateMachine",
        &[ArtifactField::new("DefinitionS3Location", FILE, BUCKET_KEY)],
    ),
    (
        "AWS::ElasticBeanstalk::ApplicationVersion",
        &[ArtifactField::new("SourceBundle", FILE, S3_OBJECT).or_current_dir()],
    ),
    (
        "AWS::Glue::Job",
        &[ArtifactField::new("Command.ScriptLocation", FILE, LocatorStyle::S3Uri)],
    ),
    (
        "AWS::CloudFormation::Stack",
        &[ArtifactField::new("TemplateURL", TEMPLATE, LocatorStyle::PathStyleUrl)],
    ),
];

/// Artifact-reference fields of a resource type; empty for types with none.
pub fn artifact_fields(resource_type: &str) -> &'static [ArtifactField] {
    ARTIFACT_TABLE
        .iter()
        .find(|(ty, _)| *ty == resource_type)
        .map(|(_, fields)| *fields)
        .unwrap_or(&[])
}

