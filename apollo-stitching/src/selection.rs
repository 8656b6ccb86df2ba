//! Selection sets requested on merged types.
//!
//! Required selections from merge configurations, the fields still to resolve and the selections
//! sent to services all use this model. It is built from the `apollo-compiler` AST without schema
//! validation: a required selection is written against the type of the service that *owns* the
//! data, not of the one declaring the requirement, so it cannot be validated against a single
//! schema.

use std::collections::HashSet;
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::ast::NamedType;
use indexmap::IndexMap;

use crate::contains::fragment_condition_applies;
use crate::error::StitchingError;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Whether `name` is the `__typename` meta field, which never needs delegation.
pub(crate) fn is_typename(name: &Name) -> bool {
    name.as_str() == "__typename"
}

/// A selection: a field, an inline fragment, or a spread of a named fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(Node<Field>),
    InlineFragment(Node<InlineFragment>),
    FragmentSpread(Node<FragmentSpread>),
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// An optional alias for the field.
    pub alias: Option<Name>,

    /// The name of the field.
    pub name: Name,

    pub arguments: Vec<Node<ast::Argument>>,

    pub directives: ast::DirectiveList,

    /// The sub-selections of the field, empty for leaf fields.
    pub selection_set: SelectionSet,
}

impl Field {
    /// A field without alias, arguments, directives or sub-selections.
    pub fn new(name: Name) -> Self {
        Field {
            alias: None,
            name,
            arguments: Vec::new(),
            directives: ast::DirectiveList::default(),
            selection_set: SelectionSet::default(),
        }
    }

    /// The key under which this field appears in the response.
    pub fn response_key(&self) -> &Name {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    /// The required fragment type.
    pub type_condition: Option<NamedType>,

    pub directives: ast::DirectiveList,

    /// The selections from the fragment.
    pub selection_set: SelectionSet,
}

/// A spread of a named fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub fragment_name: Name,
    pub directives: ast::DirectiveList,
}

/// A named fragment definition of an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub name: Name,
    pub type_condition: NamedType,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

impl SelectionSet {
    /// A selection set of field selections, in the given order.
    pub fn from_fields(fields: impl IntoIterator<Item = Node<Field>>) -> Self {
        SelectionSet {
            selections: fields.into_iter().map(Selection::Field).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Iterate over the top-level field selections, skipping fragments.
    pub fn fields(&self) -> impl Iterator<Item = &Node<Field>> {
        self.selections.iter().filter_map(|selection| match selection {
            Selection::Field(field) => Some(field),
            _ => None,
        })
    }

    /// Concatenates the selections of both sets.
    pub fn concat(&self, other: &SelectionSet) -> SelectionSet {
        SelectionSet {
            selections: self
                .selections
                .iter()
                .chain(other.selections.iter())
                .cloned()
                .collect(),
        }
    }

    /// Keeps the first field per response key and the first spread per fragment name, and folds
    /// every inline fragment into one.
    pub fn deduplicated(&self) -> SelectionSet {
        let mut seen_fields = HashSet::new();
        let mut seen_spreads = HashSet::new();
        let mut selections = Vec::with_capacity(self.selections.len());
        let mut fragment_index: Option<usize> = None;
        for selection in &self.selections {
            match selection {
                Selection::Field(field) => {
                    if seen_fields.insert(field.response_key().clone()) {
                        selections.push(selection.clone());
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if seen_spreads.insert(spread.fragment_name.clone()) {
                        selections.push(selection.clone());
                    }
                }
                Selection::InlineFragment(fragment) => match fragment_index {
                    Some(index) => {
                        if let Selection::InlineFragment(existing) = &selections[index] {
                            let type_condition = existing
                                .type_condition
                                .clone()
                                .or_else(|| fragment.type_condition.clone());
                            let merged = concat_inline_fragments(
                                type_condition,
                                [existing.as_ref(), fragment.as_ref()],
                            );
                            selections[index] = Selection::InlineFragment(Node::new(merged));
                        }
                    }
                    None => {
                        fragment_index = Some(selections.len());
                        selections.push(selection.clone());
                    }
                },
            }
        }
        SelectionSet { selections }
    }
}

/// Parses selection text such as `{ id }` or `id dimensions { weight }`.
pub fn parse_selection_set(source_text: &str) -> Result<SelectionSet, StitchingError> {
    let trimmed = source_text.trim();
    let wrapped;
    let text = if trimmed.starts_with('{') {
        trimmed
    } else {
        wrapped = format!("{{ {trimmed} }}");
        &wrapped
    };
    let document = ast::Document::parse(text, "selection_set.graphql")
        .map_err(|errors| StitchingError::invalid_selection_set(source_text, errors))?;
    let mut operations = document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => Some(operation),
            _ => None,
        });
    match (operations.next(), document.definitions.len()) {
        (Some(operation), 1) if operation.name.is_none() => {
            Ok(SelectionSet::from_ast(&operation.selection_set))
        }
        _ => Err(StitchingError::InvalidSelectionSet {
            source_text: source_text.to_owned(),
            message: "expected a single selection set".to_owned(),
        }),
    }
}

/// Parses either `fragment Name on Type { ... }` or `... on Type { ... }` into an inline fragment
/// with a type condition.
pub fn parse_fragment_to_inline_fragment(
    source_text: &str,
) -> Result<InlineFragment, StitchingError> {
    let trimmed = source_text.trim();
    let invalid = |message: String| StitchingError::InvalidFragment {
        source_text: source_text.to_owned(),
        message,
    };
    if trimmed.starts_with("fragment") {
        let document = ast::Document::parse(trimmed, "fragment.graphql")
            .map_err(|errors| invalid(errors.errors.to_string()))?;
        return document
            .definitions
            .iter()
            .find_map(|definition| match definition {
                ast::Definition::FragmentDefinition(fragment) => Some(InlineFragment {
                    type_condition: Some(fragment.type_condition.clone()),
                    directives: fragment.directives.clone(),
                    selection_set: SelectionSet::from_ast(&fragment.selection_set),
                }),
                _ => None,
            })
            .ok_or_else(|| invalid("expected a fragment definition".to_owned()));
    }
    if trimmed.starts_with("...") {
        let selection_set =
            parse_selection_set(trimmed).map_err(|error| invalid(error.to_string()))?;
        return match selection_set.selections.as_slice() {
            [Selection::InlineFragment(fragment)] if fragment.type_condition.is_some() => {
                Ok(fragment.as_ref().clone())
            }
            _ => Err(invalid(
                "expected a single inline fragment with a type condition".to_owned(),
            )),
        };
    }
    Err(invalid(
        "a fragment must start with `fragment` or `...`".to_owned(),
    ))
}

/// Combines fragments into one inline fragment on `type_condition`, deduplicating selections.
pub fn concat_inline_fragments<'a>(
    type_condition: Option<NamedType>,
    fragments: impl IntoIterator<Item = &'a InlineFragment>,
) -> InlineFragment {
    let selections = fragments
        .into_iter()
        .flat_map(|fragment| fragment.selection_set.selections.iter().cloned())
        .collect();
    InlineFragment {
        type_condition,
        directives: ast::DirectiveList::default(),
        selection_set: SelectionSet { selections }.deduplicated(),
    }
}

impl SelectionSet {
    pub(crate) fn from_ast(selections: &[ast::Selection]) -> Self {
        SelectionSet {
            selections: selections
                .iter()
                .map(|selection| match selection {
                    ast::Selection::Field(field) => Selection::Field(Node::new(Field {
                        alias: field.alias.clone(),
                        name: field.name.clone(),
                        arguments: field.arguments.clone(),
                        directives: field.directives.clone(),
                        selection_set: SelectionSet::from_ast(&field.selection_set),
                    })),
                    ast::Selection::InlineFragment(fragment) => {
                        Selection::InlineFragment(Node::new(InlineFragment {
                            type_condition: fragment.type_condition.clone(),
                            directives: fragment.directives.clone(),
                            selection_set: SelectionSet::from_ast(&fragment.selection_set),
                        }))
                    }
                    ast::Selection::FragmentSpread(spread) => {
                        Selection::FragmentSpread(Node::new(FragmentSpread {
                            fragment_name: spread.fragment_name.clone(),
                            directives: spread.directives.clone(),
                        }))
                    }
                })
                .collect(),
        }
    }
}

/// An executable operation: its root selection set and the named fragments it defines.
#[derive(Debug, Clone, Default)]
pub struct Operation {
    pub selection_set: SelectionSet,
    pub fragments: IndexMap<Name, Node<Fragment>>,
    /// The default values of the variables that declare one.
    pub variable_defaults: Object,
}

impl Operation {
    /// Parses an operation document. The document must contain exactly one operation.
    pub fn parse(source_text: &str) -> Result<Operation, StitchingError> {
        let document = ast::Document::parse(source_text, "operation.graphql").map_err(|errors| {
            StitchingError::InvalidOperation {
                message: errors.errors.to_string(),
            }
        })?;
        let mut selection_set = None;
        let mut fragments = IndexMap::new();
        let mut variable_defaults = Object::new();
        for definition in &document.definitions {
            match definition {
                ast::Definition::OperationDefinition(operation) => {
                    if selection_set.is_some() {
                        return Err(StitchingError::InvalidOperation {
                            message: "expected a single operation".to_owned(),
                        });
                    }
                    selection_set = Some(SelectionSet::from_ast(&operation.selection_set));
                    variable_defaults = operation
                        .variables
                        .iter()
                        .filter_map(|definition| {
                            let value = parse_value(definition.default_value.as_ref()?)?;
                            Some((definition.name.as_str().into(), value))
                        })
                        .collect();
                }
                ast::Definition::FragmentDefinition(fragment) => {
                    fragments.insert(
                        fragment.name.clone(),
                        Node::new(Fragment {
                            name: fragment.name.clone(),
                            type_condition: fragment.type_condition.clone(),
                            selection_set: SelectionSet::from_ast(&fragment.selection_set),
                        }),
                    );
                }
                _ => {
                    return Err(StitchingError::InvalidOperation {
                        message: "only operations and fragments are allowed".to_owned(),
                    });
                }
            }
        }
        let selection_set = selection_set.ok_or_else(|| StitchingError::InvalidOperation {
            message: "no operation found".to_owned(),
        })?;
        Ok(Operation {
            selection_set,
            fragments,
            variable_defaults,
        })
    }

    /// The root field selected under `response_key`.
    pub fn root_field(&self, response_key: &str) -> Option<&Node<Field>> {
        self.selection_set
            .fields()
            .find(|field| field.response_key().as_str() == response_key)
    }
}

/// Converts a constant value to JSON. `None` if it refers to a variable.
fn parse_value(value: &ast::Value) -> Option<Value> {
    match value {
        ast::Value::Variable(_) => None,
        ast::Value::Null => Some(Value::Null),
        ast::Value::Boolean(value) => Some(Value::Bool(*value)),
        ast::Value::String(value) => Some(value.as_str().into()),
        ast::Value::Enum(value) => Some(value.as_str().into()),
        ast::Value::Float(value) => value.try_to_f64().ok().map(Into::into),
        ast::Value::Int(value) => {
            let text = value.as_str();
            text.parse::<i64>()
                .ok()
                .map(Into::into)
                .or_else(|| text.parse::<f64>().ok().map(Into::into))
        }
        ast::Value::List(values) => values
            .iter()
            .map(|value| parse_value(value))
            .collect::<Option<_>>()
            .map(Value::Array),
        ast::Value::Object(fields) => fields
            .iter()
            .map(|(name, value)| Some((name.as_str().into(), parse_value(value)?)))
            .collect::<Option<_>>()
            .map(Value::Object),
    }
}

/// Collects the fields selected on an object type, grouped by response key, the way GraphQL
/// execution does: fragment spreads are expanded once, inline fragments and spreads only apply when
/// their type condition matches, and `@skip`/`@include` are honored.
pub(crate) struct FieldCollector<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) fragments: &'a IndexMap<Name, Node<Fragment>>,
    pub(crate) variables: &'a Object,
    pub(crate) visited_fragments: HashSet<Name>,
}

impl FieldCollector<'_> {
    pub(crate) fn collect(
        &mut self,
        type_name: &NamedType,
        selection_set: &SelectionSet,
        fields: &mut IndexMap<Name, Vec<Node<Field>>>,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if !self.should_include(&field.directives) {
                        continue;
                    }
                    fields
                        .entry(field.response_key().clone())
                        .or_default()
                        .push(field.clone());
                }
                Selection::InlineFragment(fragment) => {
                    if !self.should_include(&fragment.directives)
                        || !fragment.type_condition.as_ref().is_none_or(|condition| {
                            fragment_condition_applies(self.schema, condition, type_name)
                        })
                    {
                        continue;
                    }
                    self.collect(type_name, &fragment.selection_set, fields);
                }
                Selection::FragmentSpread(spread) => {
                    if !self.should_include(&spread.directives)
                        || !self.visited_fragments.insert(spread.fragment_name.clone())
                    {
                        continue;
                    }
                    let Some(fragment) = self.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    if !fragment_condition_applies(
                        self.schema,
                        &fragment.type_condition,
                        type_name,
                    ) {
                        continue;
                    }
                    self.collect(type_name, &fragment.selection_set, fields);
                }
            }
        }
    }

    fn should_include(&self, directives: &ast::DirectiveList) -> bool {
        let condition = |directive_name: &str| {
            directives
                .iter()
                .find(|directive| directive.name.as_str() == directive_name)
                .and_then(|directive| {
                    directive
                        .arguments
                        .iter()
                        .find(|argument| argument.name.as_str() == "if")
                })
                .map(|argument| match argument.value.as_ref() {
                    ast::Value::Boolean(value) => *value,
                    ast::Value::Variable(variable) => matches!(
                        self.variables.get(variable.as_str()),
                        Some(Value::Bool(true))
                    ),
                    _ => false,
                })
        };
        condition("skip") != Some(true) && condition("include") != Some(false)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for selection in &self.selections {
            f.write_str(" ")?;
            match selection {
                Selection::Field(field) => write!(f, "{field}")?,
                Selection::InlineFragment(fragment) => write!(f, "{fragment}")?,
                Selection::FragmentSpread(spread) => {
                    write!(f, "...{}", spread.fragment_name)?;
                    write_directives(f, &spread.directives)?;
                }
            }
        }
        f.write_str(" }")
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(alias) = &self.alias {
            write!(f, "{alias}: ")?;
        }
        f.write_str(&self.name)?;
        write_arguments(f, &self.arguments)?;
        write_directives(f, &self.directives)?;
        if !self.selection_set.is_empty() {
            write!(f, " {}", self.selection_set)?;
        }
        Ok(())
    }
}

impl fmt::Display for InlineFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("...")?;
        if let Some(type_condition) = &self.type_condition {
            write!(f, " on {type_condition}")?;
        }
        write_directives(f, &self.directives)?;
        write!(f, " {}", self.selection_set)
    }
}

fn write_arguments(f: &mut fmt::Formatter<'_>, arguments: &[Node<ast::Argument>]) -> fmt::Result {
    if arguments.is_empty() {
        return Ok(());
    }
    f.write_str("(")?;
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}: {}", argument.name, argument.value)?;
    }
    f.write_str(")")
}

fn write_directives(f: &mut fmt::Formatter<'_>, directives: &ast::DirectiveList) -> fmt::Result {
    for directive in directives.iter() {
        write!(f, " @{}", directive.name)?;
        write_arguments(f, &directive.arguments)?;
    }
    Ok(())
}
