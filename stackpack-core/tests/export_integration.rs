use std::fs;
use std::path::Path;

use serde_json::{json, Value};
use tempfile::tempdir;

use stackpack_core::archive::{fingerprint, zip_directory};
use stackpack_core::exporter::TemplateExporter;
use stackpack_core::store::{MemoryObjectStore, StoreCall};
use stackpack_core::template::{parse_template, render, OutputFormat};
use stackpack_core::{ArtifactUploader, PackageError, UploadSettings};

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn export_with(store: &MemoryObjectStore, template: &Path, settings: UploadSettings) -> Result<Value, PackageError> {
    let mut uploader = ArtifactUploader::new(store.clone(), settings);
    let mut exporter = TemplateExporter::new(&mut uploader);
    exporter.export(template, template.parent().unwrap())
}

fn export(store: &MemoryObjectStore, template: &Path) -> Result<Value, PackageError> {
    export_with(store, template, UploadSettings::new("my-bucket"))
}

const FUNCTION_TEMPLATE: &str = r#"
AWSTemplateFormatVersion: '2010-09-09'
Transform: AWS::Serverless-2016-10-31
Parameters:
  Stage:
    Type: String
    Default: dev
Resources:
  HelloFunction:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: ./src
      Handler: app.handler
      Runtime: python3.12
Outputs:
  FunctionArn:
    Value: !GetAtt HelloFunction.Arn
"#;

#[test]
fn test_directory_code_uri_is_zipped_uploaded_and_replaced() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "template.yaml", FUNCTION_TEMPLATE);
    write(root, "src/app.py", "def handler(event, context):\n    return 'hello'\n");
    write(root, "src/requirements.txt", "requests\n");

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("template.yaml")).expect("export should succeed");

    let expected_fp = fingerprint(&zip_directory(&root.join("src")).unwrap());
    assert_eq!(
        exported["Resources"]["HelloFunction"]["Properties"]["CodeUri"],
        json!(format!("s3://my-bucket/{expected_fp}"))
    );
    assert_eq!(store.put_count(), 1);

    // Everything that is not an artifact reference passes through.
    assert_eq!(exported["Parameters"]["Stage"]["Default"], json!("dev"));
    assert_eq!(
        exported["Resources"]["HelloFunction"]["Properties"]["Handler"],
        json!("app.handler")
    );
    assert_eq!(
        exported["Outputs"]["FunctionArn"]["Value"],
        json!({"Fn::GetAtt": ["HelloFunction", "Arn"]})
    );
}

#[test]
fn test_export_is_idempotent_against_a_store_holding_the_artifacts() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(root, "template.yaml", FUNCTION_TEMPLATE);
    write(root, "src/app.py", "print('hi')\n");
    write(root, "src/lib/util.py", "X = 1\n");

    let store = MemoryObjectStore::new();
    let first = export(&store, &root.join("template.yaml")).unwrap();
    let puts_after_first = store.put_count();
    let second = export(&store, &root.join("template.yaml")).unwrap();

    assert_eq!(
        render(&first, OutputFormat::Yaml).unwrap(),
        render(&second, OutputFormat::Yaml).unwrap()
    );
    assert_eq!(store.put_count(), puts_after_first, "second run must not transfer");
}

#[test]
fn test_identical_files_share_a_locator_and_different_files_do_not() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "template.yaml",
        r#"
Resources:
  ApiA:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: a.yaml
  ApiB:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: b.yaml
  ApiC:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: c.yaml
"#,
    );
    write(root, "a.yaml", "openapi: 3.0.0\n");
    write(root, "b.yaml", "openapi: 3.0.0\n");
    write(root, "c.yaml", "openapi: 3.0.1\n");

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("template.yaml")).unwrap();
    let uri = |id: &str| exported["Resources"][id]["Properties"]["DefinitionUri"].clone();

    assert_eq!(uri("ApiA"), uri("ApiB"));
    assert_ne!(uri("ApiA"), uri("ApiC"));
    assert_eq!(uri("ApiA"), json!(format!("s3://my-bucket/{}", fingerprint(b"openapi: 3.0.0\n"))));
    assert_eq!(store.put_count(), 2);
}

#[test]
fn test_remote_references_and_inline_values_are_left_untouched() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    let source = r#"
Resources:
  Remote:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: s3://other-bucket/code.zip
  Inline:
    Type: AWS::Lambda::Function
    Properties:
      Code:
        ZipFile: "exports.handler = async () => 'ok';"
  InlineServerless:
    Type: AWS::Serverless::Function
    Properties:
      InlineCode: "def handler(e, c): pass"
  Nested:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: https://s3.amazonaws.com/my-bucket/child
  Dynamic:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: !Sub "s3://${Bucket}/api.yaml"
"#;
    write(root, "template.yaml", source);

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("template.yaml")).unwrap();

    assert_eq!(exported, parse_template(source).unwrap());
    assert!(store.calls().is_empty());
}

#[test]
fn test_missing_local_path_fails_without_any_upload() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "template.yaml",
        r#"
Resources:
  Present:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: api.yaml
  Broken:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: ./does-not-exist
"#,
    );
    write(root, "api.yaml", "openapi: 3.0.0\n");

    // Resources are resolved in order, so put `Broken` first to check zero uploads.
    write(
        root,
        "broken-first.yaml",
        r#"
Resources:
  Broken:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: ./does-not-exist
  Present:
    Type: AWS::Serverless::Api
    Properties:
      DefinitionUri: api.yaml
"#,
    );

    let store = MemoryObjectStore::new();
    let err = export(&store, &root.join("broken-first.yaml")).unwrap_err();
    match err {
        PackageError::MissingArtifact {
            resource_id,
            property,
            path,
        } => {
            assert_eq!(resource_id, "Broken");
            assert_eq!(property, "CodeUri");
            assert!(path.ends_with("does-not-exist"));
        }
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
    assert!(store.calls().is_empty());

    let err = export(&store, &root.join("template.yaml")).unwrap_err();
    assert!(err.to_string().contains("Broken"));
}

#[test]
fn test_missing_code_property_packages_template_directory() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "template.yaml",
        r#"
Resources:
  Fn:
    Type: AWS::Serverless::Function
    Properties:
      Handler: index.handler
  Api:
    Type: AWS::Serverless::Api
    Properties:
      StageName: prod
"#,
    );
    write(root, "index.js", "exports.handler = async () => 'ok';\n");

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("template.yaml")).unwrap();

    let code_uri = exported["Resources"]["Fn"]["Properties"]["CodeUri"]
        .as_str()
        .expect("CodeUri should have been added");
    assert!(code_uri.starts_with("s3://my-bucket/"));
    assert!(exported["Resources"]["Api"]["Properties"]
        .get("DefinitionUri")
        .is_none());
}

#[test]
fn test_object_field_locators_and_nested_properties() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "template.yaml",
        r#"
Resources:
  Fn:
    Type: AWS::Lambda::Function
    Properties:
      Code: handler.py
      Handler: handler.main
  Rest:
    Type: AWS::ApiGateway::RestApi
    Properties:
      BodyS3Location: swagger.json
  Etl:
    Type: AWS::Glue::Job
    Properties:
      Command:
        Name: glueetl
        ScriptLocation: scripts/etl.py
"#,
    );
    write(root, "handler.py", "def main(e, c): pass\n");
    write(root, "swagger.json", "{\"swagger\": \"2.0\"}\n");
    write(root, "scripts/etl.py", "print('etl')\n");

    let store = MemoryObjectStore::new();
    let mut settings = UploadSettings::new("my-bucket");
    settings.prefix = Some("builds".to_string());
    let exported = export_with(&store, &root.join("template.yaml"), settings).unwrap();

    let code = &exported["Resources"]["Fn"]["Properties"]["Code"];
    assert_eq!(code["S3Bucket"], json!("my-bucket"));
    let key = code["S3Key"].as_str().unwrap();
    assert!(key.starts_with("builds/"));

    // A plain source file for Lambda code is zipped before upload.
    let stored = store.get("my-bucket", key).unwrap();
    assert!(stored.body.starts_with(&[0x50, 0x4b, 0x03, 0x04]));

    let body = &exported["Resources"]["Rest"]["Properties"]["BodyS3Location"];
    assert_eq!(body["Bucket"], json!("my-bucket"));
    assert_eq!(
        body["Key"],
        json!(format!("builds/{}", fingerprint(b"{\"swagger\": \"2.0\"}\n")))
    );

    let command = &exported["Resources"]["Etl"]["Properties"]["Command"];
    assert_eq!(command["Name"], json!("glueetl"));
    assert_eq!(
        command["ScriptLocation"],
        json!(format!("s3://my-bucket/builds/{}", fingerprint(b"print('etl')\n")))
    );
}

#[test]
fn test_nested_template_is_exported_before_its_parent_uploads_it() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "parent.yaml",
        r#"
Resources:
  Child:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: nested/child.yaml
"#,
    );
    write(
        root,
        "nested/child.yaml",
        r#"
Resources:
  Worker:
    Type: AWS::Serverless::Function
    Properties:
      CodeUri: ./worker
"#,
    );
    write(root, "nested/worker/main.py", "print('work')\n");

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("parent.yaml")).unwrap();

    let url = exported["Resources"]["Child"]["Properties"]["TemplateURL"]
        .as_str()
        .unwrap()
        .to_string();
    let key = url
        .strip_prefix("https://s3.amazonaws.com/my-bucket/")
        .expect("nested templates are referenced by path-style URL");

    let worker_fp = fingerprint(&zip_directory(&root.join("nested/worker")).unwrap());
    let child_body = String::from_utf8(store.get("my-bucket", key).unwrap().body).unwrap();
    assert!(
        child_body.contains(&format!("s3://my-bucket/{worker_fp}")),
        "uploaded child must reference its own uploaded code, got:\n{child_body}"
    );

    let again = export(&store, &root.join("parent.yaml")).unwrap();
    assert_eq!(again["Resources"]["Child"]["Properties"]["TemplateURL"], json!(url));
}

#[test]
fn test_self_referencing_nested_templates_fail_cleanly() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "a.yaml",
        r#"
Resources:
  B:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: b.yaml
"#,
    );
    write(
        root,
        "b.yaml",
        r#"
Resources:
  A:
    Type: AWS::Serverless::Application
    Properties:
      Location: ./a.yaml
"#,
    );

    let store = MemoryObjectStore::new();
    let err = export(&store, &root.join("a.yaml")).unwrap_err();
    match err {
        PackageError::CyclicTemplate { path } => assert!(path.ends_with("a.yaml")),
        other => panic!("expected CyclicTemplate, got {other:?}"),
    }
    assert!(!store
        .calls()
        .iter()
        .any(|c| matches!(c, StoreCall::Put { .. })));
}

#[test]
fn test_same_child_referenced_twice_is_not_a_cycle() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "parent.yaml",
        r#"
Resources:
  First:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: child.yaml
  Second:
    Type: AWS::CloudFormation::Stack
    Properties:
      TemplateURL: child.yaml
"#,
    );
    write(root, "child.yaml", "Resources: {}\n");

    let store = MemoryObjectStore::new();
    let exported = export(&store, &root.join("parent.yaml")).unwrap();
    assert_eq!(
        exported["Resources"]["First"]["Properties"]["TemplateURL"],
        exported["Resources"]["Second"]["Properties"]["TemplateURL"]
    );
    assert_eq!(store.put_count(), 1);
}

#[test]
fn test_resolver_with_one_missing_template_uploads_neither() {
    let tmp = tempdir().unwrap();
    let root = tmp.path();
    write(
        root,
        "template.yaml",
        r#"
Resources:
  GetItem:
    Type: AWS::AppSync::Resolver
    Properties:
      TypeName: Query
      FieldName: getItem
      RequestMappingTemplateS3Location: req.vtl
      ResponseMappingTemplateS3Location: missing.vtl
"#,
    );
    write(root, "req.vtl", "{\"version\": \"2018-05-29\"}\n");

    let store = MemoryObjectStore::new();
    let err = export(&store, &root.join("template.yaml")).unwrap_err();
    match err {
        PackageError::MissingArtifact {
            resource_id,
            property,
            ..
        } => {
            assert_eq!(resource_id, "GetItem");
            assert_eq!(property, "ResponseMappingTemplateS3Location");
        }
        other => panic!("expected MissingArtifact, got {other:?}"),
    }
    assert!(store.calls().is_empty(), "got {:?}", store.calls());
}
