use std::sync::Arc;

use ddv_lang::{
    Action, ArtifactCache, ChangeSet, Checksum, FieldKind, MemoryGraph, Model, ModelDescriptor, ModelRegistry,
    Outcome, Principal, QueryEngine, QueryStep, RuleEngine, Runtime, RuntimeContract, RuntimeProvider,
    SyntaxErrorKind, Template, TemplateEngine, Value,
};
use rstest::{fixture, rstest};

#[fixture]
fn registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(
            ModelDescriptor::new("Person")
                .field("Name", FieldKind::String)
                .field("Tags", FieldKind::Array),
        )
        .unwrap();
    registry
        .register(ModelDescriptor::new("Invoice").field("Total", FieldKind::Number))
        .unwrap();
    registry
}

#[fixture]
fn graph() -> MemoryGraph {
    MemoryGraph::from_json(
        r#"{
          "vertices": [
            {"id": "ada", "type": "Person", "fields": {"name": "Ada", "age": 36}},
            {"id": "bob", "type": "Person", "fields": {"name": "Bob", "age": 25}},
            {"id": "cyd", "type": "Person", "fields": {"name": "Cyd", "age": 41}},
            {"id": "r2", "type": "Robot", "fields": {"name": "R2"}}
          ],
          "edges": [
            {"id": "e1", "label": "knows", "from": "ada", "to": "bob"},
            {"id": "e2", "label": "knows", "from": "bob", "to": "cyd"},
            {"id": "e3", "label": "owns", "from": "ada", "to": "r2"}
          ]
        }"#,
    )
    .unwrap()
}

fn ada() -> Model {
    Model::new("Person")
        .with("Name", "Ada")
        .with("Tags", vec!["math", "engines", "poetry"])
}

#[rstest]
#[case::limit("Person LIMIT 10", 0, 10)]
#[case::offset_limit("Person LIMIT 5, 10", 5, 10)]
#[case::zero_count("Person LIMIT 3, 0", 3, 0)]
fn test_limit_forms(#[case] query: &str, #[case] offset: usize, #[case] count: usize) {
    let pipeline = ddv_lang::compile_query(query).unwrap();
    assert!(pipeline.steps().contains(&QueryStep::Limit { offset, count }));
    assert_eq!(pipeline.step_names(), vec!["Union", "ReturnFor", "Limit", "Project"]);
}

#[rstest]
#[case::above_u64("Person LIMIT 18446744073709551617")]
#[case::above_exact_integers("Person LIMIT 9007199254740993")]
#[case::offset_above_exact_integers("Person LIMIT 9007199254740993, 10")]
#[case::fraction("Person LIMIT 2.5")]
fn test_limit_out_of_range(#[case] query: &str) {
    let err = ddv_lang::compile_query(query).unwrap_err();
    assert_eq!(err.syntax_errors()[0].kind, SyntaxErrorKind::InvalidNumber);
}

#[rstest]
#[case::single("Person", vec!["Union", "ReturnFor", "Project"])]
#[case::mixed("A UNION B INTERSECT C", vec!["Union", "Intersect", "ReturnFor", "Project"])]
#[case::sorted("A EXCLUDE B ORDER BY name DESC", vec!["Union", "Exclude", "ReturnFor", "Sort", "Project"])]
#[case::paths("A-[knows]->B RETURNS PATHS", vec!["Union", "ReturnFor", "Project"])]
fn test_pipeline_steps(#[case] query: &str, #[case] expected: Vec<&str>) {
    assert_eq!(ddv_lang::compile_query(query).unwrap().step_names(), expected);
}

#[rstest]
#[case::unregistered("Person UNION Robot", false)]
#[case::registered("Person UNION Invoice", true)]
fn test_compile_query_with_registry(registry: ModelRegistry, #[case] query: &str, #[case] ok: bool) {
    assert_eq!(ddv_lang::compile_query_with(query, &registry).is_ok(), ok);
}

#[rstest]
#[case::filter("Person(age > 30)", vec!["ada", "cyd"])]
#[case::traversal("Person(name = \"Ada\")-[knows]->*", vec!["bob"])]
#[case::union("Person(age < 30) UNION Robot", vec!["bob", "r2"])]
#[case::exclude("Person EXCLUDE Person(age > 30)", vec!["bob"])]
#[case::sorted("Person ORDER BY age DESC LIMIT 2", vec!["cyd", "ada"])]
fn test_query_engine(graph: MemoryGraph, #[case] query: &str, #[case] expected: Vec<&str>) {
    let engine = QueryEngine::new();
    let result = engine.query(&graph, None, query).unwrap();
    assert_eq!(result.ids(), expected);
}

#[rstest]
fn test_query_engine_caches_named_queries(graph: MemoryGraph) {
    let engine = QueryEngine::new();
    engine.query(&graph, Some("adults"), "Person(age > 30)").unwrap();
    engine.query(&graph, Some("adults"), "Person(age > 30)").unwrap();
    engine.query(&graph, Some("adults"), "Person(age > 40)").unwrap();

    let stats = engine.cache().stats();
    assert_eq!((stats.builds, stats.hits, stats.evictions), (2, 1, 1));
}

#[test]
fn test_artifact_cache_identity_and_invalidation() {
    let cache: ArtifactCache<String> = ArtifactCache::new();
    let build = |text: &str| {
        let text = text.to_string();
        move || Ok::<_, ()>(text)
    };

    let first = cache
        .get_or_build(Some("page"), "Person", Checksum::of("v1"), build("v1"))
        .unwrap();
    let second = cache
        .get_or_build(Some("page"), "Person", Checksum::of("v1"), build("v1"))
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.stats().builds, 1);

    let third = cache
        .get_or_build(Some("page"), "Person", Checksum::of("v2"), build("v2"))
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(third.as_str(), "v2");
    assert_eq!(cache.stats().evictions, 1);

    assert!(cache.get_or_build(Some("page"), "Person", Checksum::of("v3"), || Err(())).is_err());
    assert!(cache.get("page", "Person").is_none());
}

#[rstest]
#[case::interpolation("Hello [[@model.Name]]!", "Hello Ada!")]
#[case::if_false("<p ddv-if=\"false\">hidden</p><p ddv-if=\"true\">shown</p>", "<p>shown</p>")]
#[case::repeat_order(
    "<ol><li ddv-repeat=\"tag in @model.Tags\">[[tag]]</li></ol>",
    "<ol><li>math</li><li>engines</li><li>poetry</li></ol>"
)]
#[case::nested(
    "<div ddv-if=\"len(@model.Tags) > 0\"><b ddv-repeat=\"t in @model.Tags\">[[upper(t)]]</b></div>",
    "<div><b>MATH</b><b>ENGINES</b><b>POETRY</b></div>"
)]
#[case::scriptlet("<ddv>let n = len(@model.Tags); write(n);</ddv> tags", "3 tags")]
#[case::void("<img src=\"/a/[[@model.Name]].png\"><br/>", "<img src=\"/a/Ada.png\"><br />")]
fn test_render_template(registry: ModelRegistry, #[case] source: &str, #[case] expected: &str) {
    let engine = TemplateEngine::new(registry);
    let output = engine
        .render(&Template::new("page", source), &ada(), &Principal::anonymous())
        .unwrap();
    assert_eq!(output, expected);
}

#[rstest]
fn test_render_fault_replaces_output(registry: ModelRegistry) {
    let engine = TemplateEngine::new(registry);
    let template = Template::new("page", "<h1>[[@model.Name]]</h1>[[error(\"not allowed\")]]");
    assert_eq!(
        engine.render(&template, &ada(), &Principal::anonymous()).unwrap(),
        "not allowed"
    );
}

#[rstest]
fn test_render_rejects_invalid_model(registry: ModelRegistry) {
    let engine = TemplateEngine::new(registry);
    let model = Model::new("Person").with("Name", 42).with("Tags", Vec::<Value>::new());
    assert!(
        engine
            .render(&Template::new("page", "[[@model.Name]]"), &model, &Principal::anonymous())
            .is_err()
    );
}

#[rstest]
#[case::expression(format!("[[{}1{}]]", "(".repeat(3000), ")".repeat(3000)))]
#[case::unary(format!("[[{}true]]", "!".repeat(3000)))]
#[case::unclosed_markup("<b>".repeat(3000))]
#[case::closed_markup(format!("{}x{}", "<b>".repeat(3000), "</b>".repeat(3000)))]
#[case::scriptlet(format!("<ddv>{}write(1);{}</ddv>", "if (true) { ".repeat(3000), "}".repeat(3000)))]
fn test_render_deep_nesting_degrades_to_markers(registry: ModelRegistry, #[case] source: String) {
    let engine = TemplateEngine::new(registry);
    let output = engine
        .render(&Template::new("deep", source), &ada(), &Principal::anonymous())
        .unwrap();

    assert!(output.contains("<!--[ddv] "));
    assert!(output.contains("Nesting is too deep"));
}

#[rstest]
fn test_render_nesting_within_limit(registry: ModelRegistry) {
    let engine = TemplateEngine::new(registry);
    let source = format!("{}[[((@model.Name))]]{}", "<b>".repeat(40), "</b>".repeat(40));
    let output = engine
        .render(&Template::new("nested", source), &ada(), &Principal::anonymous())
        .unwrap();

    assert_eq!(output, format!("{}Ada{}", "<b>".repeat(40), "</b>".repeat(40)));
}

#[test]
fn test_rule_deep_nesting_is_a_syntax_error() {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDescriptor::new("Document")).unwrap();
    let engine = RuleEngine::new(registry);
    let source = format!("{}true{}", "(".repeat(3000), ")".repeat(3000));

    let err = engine.compile("deep", "Document", &source).unwrap_err();
    assert_eq!(err.syntax_errors()[0].kind, SyntaxErrorKind::NestingTooDeep);
}

#[derive(Debug)]
struct TenantProvider {
    contract: RuntimeContract,
}

impl RuntimeProvider for TenantProvider {
    fn contract(&self) -> &RuntimeContract {
        &self.contract
    }

    fn runtime(
        &self,
        _action: Action,
        principal: &Principal,
        model: &Model,
        _descriptor: Option<&ModelDescriptor>,
        _changes: &ChangeSet,
    ) -> Runtime {
        Runtime::new()
            .with("model", model.to_value())
            .with("tenant", principal.claims.get("tenant").cloned().unwrap_or_default())
    }
}

#[rstest]
fn test_custom_runtime_provider(registry: ModelRegistry) {
    let mut engine = TemplateEngine::new(registry);
    engine.set_provider(Arc::new(TenantProvider {
        contract: RuntimeContract::new("tenant", ["model", "tenant"]),
    }));

    let mut principal = Principal::new("u1", "Ada");
    principal.claims.insert("tenant".into(), "acme".into());

    let template = Template::new("page", "[[@tenant]]/[[@model.Name]]");
    assert_eq!(engine.render(&template, &ada(), &principal).unwrap(), "acme/Ada");

    // `@user` is not part of this contract.
    assert!(engine.compile(&Template::new("user", "[[@user.id]]"), "Person").is_ok());
    let output = engine
        .render(&Template::new("user", "[[@user.id]]"), &ada(), &principal)
        .unwrap();
    assert!(output.starts_with("<!--[ddv] "));
}

#[rstest]
#[case::owner("@user.id == @model.Owner", Principal::new("u1", "Ada"), Action::Update, true)]
#[case::stranger("@user.id == @model.Owner", Principal::new("u2", "Bob"), Action::Update, false)]
#[case::admin("contains(@user.roles, \"admin\")", Principal::new("u2", "Bob").with_role("admin"), Action::Delete, true)]
#[case::read_only("@action == \"Read\"", Principal::anonymous(), Action::Read, true)]
#[case::fault("error(\"no\")", Principal::new("u1", "Ada"), Action::Read, false)]
fn test_rule_authorize(
    #[case] source: &str,
    #[case] principal: Principal,
    #[case] action: Action,
    #[case] allowed: bool,
) {
    let mut registry = ModelRegistry::new();
    registry
        .register(ModelDescriptor::new("Document").field("Owner", FieldKind::String))
        .unwrap();
    let engine = RuleEngine::new(registry);
    let rule = engine.compile("access", "Document", source).unwrap();
    let model = Model::new("Document").with("Owner", "u1");

    assert_eq!(
        engine.authorize(&rule, &model, &principal, action, &ChangeSet::new()),
        allowed
    );
}

#[test]
fn test_rule_sees_changes() {
    let mut registry = ModelRegistry::new();
    registry.register(ModelDescriptor::new("Document")).unwrap();
    let engine = RuleEngine::new(registry);
    let rule = engine
        .compile("limit", "Document", "@changes.Pages.new - @changes.Pages.old")
        .unwrap();

    let outcome = engine
        .evaluate(
            &rule,
            &Model::new("Document"),
            &Principal::anonymous(),
            Action::Update,
            &ChangeSet::new().change("Pages", 10, 14),
        )
        .unwrap();
    assert_eq!(outcome, Outcome::Value(Value::from(4)));
}
