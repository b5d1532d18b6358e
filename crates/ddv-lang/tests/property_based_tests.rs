//! Property-based tests for query compilation, grammar validation and template segmentation.
use ddv_lang::template::{Segment, segments};
use ddv_lang::{
    DEFAULT_MAX_DEPTH, ExpressionGrammar, Grammar, MarkupGrammar, QueryGrammar, QueryStep, ScriptGrammar,
    SyntaxErrorKind,
};
use proptest::prelude::*;

mod strategies {
    use super::*;

    /// Model names: a capital letter followed by lowercase letters, so never a keyword.
    pub fn model_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{0,8}"
    }

    pub fn field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,8}"
    }

    pub fn aggregator() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("UNION"), Just("INTERSECT"), Just("EXCLUDE")]
    }

    pub fn predicate() -> impl Strategy<Value = String> {
        prop_oneof![
            model_name(),
            (model_name(), field_name(), 0..1000u32).prop_map(|(model, field, n)| format!("{}({} > {})", model, field, n)),
            (model_name(), field_name(), model_name())
                .prop_map(|(from, label, to)| format!("{}-[{}]->{}", from, label, to)),
            (model_name(), field_name()).prop_map(|(to, label)| format!("*<-[{}]-{}", label, to)),
        ]
    }

    /// A well-formed query: predicates joined by aggregators, then optional ORDER BY, LIMIT and RETURNS.
    pub fn query() -> impl Strategy<Value = (String, usize)> {
        (
            predicate(),
            prop::collection::vec((aggregator(), predicate()), 0..6),
            prop::option::of(field_name()),
            prop::option::of((prop::option::of(0..100usize), 0..100usize)),
            prop::option::of(prop_oneof![Just("NODES"), Just("PATHS")]),
        )
            .prop_map(|(first, rest, order, limit, returns)| {
                let mut query = first;
                for (aggregator, predicate) in &rest {
                    query.push_str(&format!(" {} {}", aggregator, predicate));
                }
                if let Some(field) = order {
                    query.push_str(&format!(" ORDER BY {}", field));
                }
                match limit {
                    Some((Some(offset), count)) => query.push_str(&format!(" LIMIT {}, {}", offset, count)),
                    Some((None, count)) => query.push_str(&format!(" LIMIT {}", count)),
                    None => {}
                }
                if let Some(returns) = returns {
                    query.push_str(&format!(" RETURNS {}", returns));
                }
                (query, rest.len() + 1)
            })
    }
}

proptest! {
    #[test]
    fn test_pipeline_shape((query, predicates) in strategies::query()) {
        let pipeline = ddv_lang::compile_query(&query).unwrap();
        let steps = pipeline.steps();

        prop_assert_eq!(steps.iter().filter(|step| **step == QueryStep::ReturnFor).count(), 1);
        prop_assert!(matches!(steps.last(), Some(QueryStep::Project(_))));
        prop_assert_eq!(steps.iter().filter(|step| matches!(step, QueryStep::Project(_))).count(), 1);
        prop_assert!(matches!(steps.first(), Some(QueryStep::Union(_))));

        let aggregates = steps.iter().take_while(|step| step.aggregator().is_some()).count();
        prop_assert!(aggregates >= 1 && aggregates <= predicates);
        prop_assert_eq!(steps[aggregates].clone(), QueryStep::ReturnFor);

        for (previous, step) in steps.iter().zip(steps.iter().skip(1)) {
            match step {
                QueryStep::Sort(_) => prop_assert_eq!(previous, &QueryStep::ReturnFor),
                QueryStep::Limit { .. } => {
                    prop_assert!(matches!(previous, QueryStep::ReturnFor | QueryStep::Sort(_)))
                }
                _ => {}
            }
        }
    }

    #[test]
    fn test_query_validate_agrees_with_compile(query in "[A-Za-z ()<>=\\-\\[\\]*,0-9\"]{0,40}") {
        let validation = QueryGrammar::validate(&query);
        let compiled = ddv_lang::compile_query(&query);

        prop_assert_eq!(validation.ok, QueryGrammar::parse(&query).into_result().is_ok());
        if !validation.ok {
            prop_assert!(compiled.is_err());
        }
    }

    #[test]
    fn test_script_validate_agrees_with_parse(source in "[a-z0-9 =+*();{}\"@.<>!&|]{0,40}") {
        let validation = ScriptGrammar::validate(&source);
        let parsed = ScriptGrammar::parse(&source).into_result();

        prop_assert_eq!(validation.ok, parsed.is_ok());
        prop_assert_eq!(validation.errors.is_empty(), validation.ok);
    }

    #[test]
    fn test_markup_never_panics(source in "[a-z<>/=\"' !\\-\\[\\]@.]{0,60}") {
        let validation = MarkupGrammar::validate(&source);
        prop_assert_eq!(validation.ok, validation.errors.is_empty());
    }

    #[test]
    fn test_deep_markup_is_bounded(depth in 0..3000usize, closed in any::<bool>()) {
        let close = if closed { "</b>".repeat(depth) } else { String::new() };
        let source = format!("{}x{}", "<b>".repeat(depth), close);
        let validation = MarkupGrammar::validate(&source);
        let too_deep = validation
            .errors
            .iter()
            .filter(|error| error.kind == SyntaxErrorKind::NestingTooDeep)
            .count();

        prop_assert_eq!(too_deep, usize::from(depth > DEFAULT_MAX_DEPTH));
        prop_assert_eq!(validation.ok, (closed || depth == 0) && depth <= DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_deep_expression_is_bounded(
        depth in 0..3000usize,
        (open, close) in prop_oneof![Just(("(", ")")), Just(("[", "]")), Just(("f(", ")"))],
    ) {
        let source = format!("{}1{}", open.repeat(depth), close.repeat(depth));
        let validation = ExpressionGrammar::validate(&source);

        // The top-level expression is one level, each bracket adds another.
        prop_assert_eq!(validation.ok, depth < DEFAULT_MAX_DEPTH);
        if !validation.ok {
            prop_assert_eq!(validation.errors.len(), 1);
            prop_assert_eq!(&validation.errors[0].kind, &SyntaxErrorKind::NestingTooDeep);
        }
    }

    #[test]
    fn test_limit_within_exact_integers(count in 0u64..=9_007_199_254_740_991u64) {
        let pipeline = ddv_lang::compile_query(&format!("Person LIMIT {}", count)).unwrap();
        let count = usize::try_from(count).unwrap();
        let expected = QueryStep::Limit { offset: 0, count };
        prop_assert!(pipeline.steps().contains(&expected));
    }

    #[test]
    fn test_limit_above_exact_integers_is_invalid(count in 9_007_199_254_740_992u128..=u128::from(u64::MAX) * 4) {
        let query = format!("Person LIMIT {}", count);
        let validation = QueryGrammar::validate(&query);

        prop_assert!(!validation.ok);
        prop_assert_eq!(&validation.errors[0].kind, &SyntaxErrorKind::InvalidNumber);
    }

    #[test]
    fn test_segments_rebuild_text(text in "[a-z \\[\\]@.]{0,40}") {
        let rebuilt: String = segments(&text)
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(text) => text.to_string(),
                Segment::Inline(source) => format!("[[{}]]", source),
            })
            .collect();

        prop_assert_eq!(rebuilt, text);
    }
}
