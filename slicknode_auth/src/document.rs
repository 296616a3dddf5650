//! A narrow model of request documents
//!
//! This is not a parser. It carries just enough structure for the link to
//! find top-level mutation fields, look at their directives, strip a
//! directive before forwarding, and print the document back to query text.
//! Arguments and variable definitions are kept as verbatim source text.

use std::fmt;

/// A request document
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Document {
    /// Top-level definitions, in source order
    pub definitions: Vec<Definition>,
}

/// A top-level definition
#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    /// An operation (query, mutation, or subscription)
    Operation(OperationDefinition),
    /// A named fragment
    Fragment(FragmentDefinition),
}

/// The kind of an operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// A read-only query
    Query,
    /// A mutation
    Mutation,
    /// A subscription
    Subscription,
}

impl OperationKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// An operation definition
#[derive(Clone, Debug, PartialEq)]
pub struct OperationDefinition {
    /// The operation kind
    pub kind: OperationKind,
    /// The operation name, if any
    pub name: Option<String>,
    /// Verbatim variable definitions, without the surrounding parentheses
    pub variable_definitions: Option<String>,
    /// Directives applied to the operation
    pub directives: Vec<Directive>,
    /// The root selections
    pub selection_set: Vec<Selection>,
}

/// A named fragment definition
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentDefinition {
    /// The fragment name
    pub name: String,
    /// The type condition
    pub type_condition: String,
    /// Directives applied to the fragment
    pub directives: Vec<Directive>,
    /// The fragment's selections
    pub selection_set: Vec<Selection>,
}

/// A single selection
#[derive(Clone, Debug, PartialEq)]
pub enum Selection {
    /// A field
    Field(Field),
    /// A spread of a named fragment
    FragmentSpread(FragmentSpread),
    /// An inline fragment
    InlineFragment(InlineFragment),
}

/// A field selection
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// The alias, if any
    pub alias: Option<String>,
    /// The field name
    pub name: String,
    /// Verbatim arguments, without the surrounding parentheses
    pub arguments: Option<String>,
    /// Directives applied to the field
    pub directives: Vec<Directive>,
    /// Nested selections
    pub selection_set: Vec<Selection>,
}

/// A named fragment spread
#[derive(Clone, Debug, PartialEq)]
pub struct FragmentSpread {
    /// The referenced fragment
    pub name: String,
    /// Directives applied to the spread
    pub directives: Vec<Directive>,
}

/// An inline fragment
#[derive(Clone, Debug, PartialEq)]
pub struct InlineFragment {
    /// The type condition, if any
    pub type_condition: Option<String>,
    /// Directives applied to the fragment
    pub directives: Vec<Directive>,
    /// The fragment's selections
    pub selection_set: Vec<Selection>,
}

/// A directive
#[derive(Clone, Debug, PartialEq)]
pub struct Directive {
    /// The directive name, without `@`
    pub name: String,
    /// Verbatim arguments, without the surrounding parentheses
    pub arguments: Option<String>,
}

impl Directive {
    /// A directive without arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: None,
        }
    }
}

impl Field {
    /// A field without alias, arguments, directives, or selections
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: None,
            directives: Vec::new(),
            selection_set: Vec::new(),
        }
    }

    /// Sets the alias
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Sets verbatim arguments
    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }

    /// Adds a directive
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Adds a nested selection
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }

    /// The key under which this field appears in response data
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether a directive with the given name is applied to this field
    pub fn has_directive(&self, name: &str) -> bool {
        self.directives.iter().any(|d| d.name == name)
    }
}

impl From<Field> for Selection {
    fn from(field: Field) -> Self {
        Selection::Field(field)
    }
}

impl From<FragmentSpread> for Selection {
    fn from(spread: FragmentSpread) -> Self {
        Selection::FragmentSpread(spread)
    }
}

impl From<InlineFragment> for Selection {
    fn from(fragment: InlineFragment) -> Self {
        Selection::InlineFragment(fragment)
    }
}

impl OperationDefinition {
    /// An unnamed operation with no selections
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            name: None,
            variable_definitions: None,
            directives: Vec::new(),
            selection_set: Vec::new(),
        }
    }

    /// Sets the operation name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets verbatim variable definitions
    pub fn with_variable_definitions(mut self, definitions: impl Into<String>) -> Self {
        self.variable_definitions = Some(definitions.into());
        self
    }

    /// Adds a root selection
    pub fn with_selection(mut self, selection: impl Into<Selection>) -> Self {
        self.selection_set.push(selection.into());
        self
    }
}

impl From<OperationDefinition> for Document {
    fn from(operation: OperationDefinition) -> Self {
        Document {
            definitions: vec![Definition::Operation(operation)],
        }
    }
}

impl Document {
    /// Finds the operation that a request named `operation_name` executes
    ///
    /// A definition matches when it is unnamed, or when both it and the
    /// request are named and the names are equal. The first match wins.
    /// Without a requested name, a document holding a single operation
    /// executes that operation whether it is named or not.
    pub fn operation(&self, operation_name: Option<&str>) -> Option<&OperationDefinition> {
        let mut operations = self.definitions.iter().filter_map(|def| match def {
            Definition::Operation(op) => Some(op),
            Definition::Fragment(_) => None,
        });

        if operation_name.is_none() {
            let only = operations.next()?;
            return match operations.next() {
                None => Some(only),
                Some(_) => self.operation_by_name(None),
            };
        }

        self.operation_by_name(operation_name)
    }

    fn operation_by_name(&self, operation_name: Option<&str>) -> Option<&OperationDefinition> {
        self.definitions.iter().find_map(|def| match def {
            Definition::Operation(op) => match (&op.name, operation_name) {
                (None, _) => Some(op),
                (Some(name), Some(requested)) if name == requested => Some(op),
                _ => None,
            },
            Definition::Fragment(_) => None,
        })
    }

    /// Removes every occurrence of the named directive
    ///
    /// Returns the number of directives removed.
    pub fn strip_directive(&mut self, name: &str) -> usize {
        self.definitions
            .iter_mut()
            .map(|def| match def {
                Definition::Operation(op) => {
                    strip(&mut op.directives, name) + strip_selections(&mut op.selection_set, name)
                }
                Definition::Fragment(frag) => {
                    strip(&mut frag.directives, name)
                        + strip_selections(&mut frag.selection_set, name)
                }
            })
            .sum()
    }

    /// Whether the named directive occurs anywhere in the document
    pub fn contains_directive(&self, name: &str) -> bool {
        self.definitions.iter().any(|def| match def {
            Definition::Operation(op) => {
                has(&op.directives, name) || selections_contain(&op.selection_set, name)
            }
            Definition::Fragment(frag) => {
                has(&frag.directives, name) || selections_contain(&frag.selection_set, name)
            }
        })
    }
}

fn has(directives: &[Directive], name: &str) -> bool {
    directives.iter().any(|d| d.name == name)
}

fn strip(directives: &mut Vec<Directive>, name: &str) -> usize {
    let before = directives.len();
    directives.retain(|d| d.name != name);
    before - directives.len()
}

fn strip_selections(selections: &mut [Selection], name: &str) -> usize {
    selections
        .iter_mut()
        .map(|sel| match sel {
            Selection::Field(field) => {
                strip(&mut field.directives, name)
                    + strip_selections(&mut field.selection_set, name)
            }
            Selection::FragmentSpread(spread) => strip(&mut spread.directives, name),
            Selection::InlineFragment(frag) => {
                strip(&mut frag.directives, name) + strip_selections(&mut frag.selection_set, name)
            }
        })
        .sum()
}

fn selections_contain(selections: &[Selection], name: &str) -> bool {
    selections.iter().any(|sel| match sel {
        Selection::Field(field) => {
            has(&field.directives, name) || selections_contain(&field.selection_set, name)
        }
        Selection::FragmentSpread(spread) => has(&spread.directives, name),
        Selection::InlineFragment(frag) => {
            has(&frag.directives, name) || selections_contain(&frag.selection_set, name)
        }
    })
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, def) in self.definitions.iter().enumerate() {
            if idx > 0 {
                f.write_str("\n\n")?;
            }
            match def {
                Definition::Operation(op) => write_operation(f, op)?,
                Definition::Fragment(frag) => {
                    write!(f, "fragment {} on {}", frag.name, frag.type_condition)?;
                    write_directives(f, &frag.directives)?;
                    write_selection_set(f, &frag.selection_set, 0)?;
                }
            }
        }
        Ok(())
    }
}

fn write_operation(f: &mut fmt::Formatter<'_>, op: &OperationDefinition) -> fmt::Result {
    f.write_str(op.kind.keyword())?;
    if let Some(name) = &op.name {
        write!(f, " {name}")?;
    }
    if let Some(vars) = &op.variable_definitions {
        if op.name.is_none() {
            f.write_str(" ")?;
        }
        write!(f, "({vars})")?;
    }
    write_directives(f, &op.directives)?;
    write_selection_set(f, &op.selection_set, 0)
}

fn write_directives(f: &mut fmt::Formatter<'_>, directives: &[Directive]) -> fmt::Result {
    for directive in directives {
        write!(f, " @{}", directive.name)?;
        if let Some(args) = &directive.arguments {
            write!(f, "({args})")?;
        }
    }
    Ok(())
}

fn write_selection_set(
    f: &mut fmt::Formatter<'_>,
    selections: &[Selection],
    depth: usize,
) -> fmt::Result {
    if selections.is_empty() {
        return Ok(());
    }

    f.write_str(" {\n")?;
    for sel in selections {
        write!(f, "{:indent$}", "", indent = (depth + 1) * 2)?;
        match sel {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    write!(f, "{alias}: ")?;
                }
                f.write_str(&field.name)?;
                if let Some(args) = &field.arguments {
                    write!(f, "({args})")?;
                }
                write_directives(f, &field.directives)?;
                write_selection_set(f, &field.selection_set, depth + 1)?;
            }
            Selection::FragmentSpread(spread) => {
                write!(f, "...{}", spread.name)?;
                write_directives(f, &spread.directives)?;
            }
            Selection::InlineFragment(frag) => {
                f.write_str("...")?;
                if let Some(cond) = &frag.type_condition {
                    write!(f, " on {cond}")?;
                }
                write_directives(f, &frag.directives)?;
                write_selection_set(f, &frag.selection_set, depth + 1)?;
            }
        }
        f.write_str("\n")?;
    }
    write!(f, "{:indent$}}}", "", indent = depth * 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_document() -> Document {
        OperationDefinition::new(OperationKind::Mutation)
            .with_name("LoginMutation")
            .with_variable_definitions("$email: String!, $password: String!")
            .with_selection(
                Field::new("loginEmailPassword")
                    .with_arguments("input: {email: $email, password: $password}")
                    .with_directive(Directive::new("authenticate"))
                    .with_selection(Field::new("accessToken"))
                    .with_selection(Field::new("accessTokenLifetime")),
            )
            .into()
    }

    #[test]
    fn prints_query_text() {
        let text = login_document().to_string();
        assert_eq!(
            text,
            "mutation LoginMutation($email: String!, $password: String!) {\n  \
             loginEmailPassword(input: {email: $email, password: $password}) @authenticate {\n    \
             accessToken\n    \
             accessTokenLifetime\n  \
             }\n\
             }"
        );
    }

    #[test]
    fn strips_directive_everywhere() {
        let mut doc = login_document();
        doc.definitions.push(Definition::Fragment(FragmentDefinition {
            name: "Tokens".into(),
            type_condition: "LoginPayload".into(),
            directives: vec![Directive::new("authenticate")],
            selection_set: vec![Field::new("refreshToken")
                .with_directive(Directive::new("authenticate"))
                .into()],
        }));

        assert!(doc.contains_directive("authenticate"));
        assert_eq!(doc.strip_directive("authenticate"), 3);
        assert!(!doc.contains_directive("authenticate"));
        assert!(!doc.to_string().contains("@authenticate"));
    }

    #[test]
    fn keeps_unrelated_directives() {
        let mut doc: Document = OperationDefinition::new(OperationKind::Query)
            .with_selection(
                Field::new("viewer")
                    .with_directive(Directive {
                        name: "include".into(),
                        arguments: Some("if: $loggedIn".into()),
                    })
                    .with_directive(Directive::new("authenticate")),
            )
            .into();

        doc.strip_directive("authenticate");

        assert_eq!(doc.to_string(), "query {\n  viewer @include(if: $loggedIn)\n}");
    }

    mod operation_lookup {
        use super::*;

        fn two_operations() -> Document {
            Document {
                definitions: vec![
                    Definition::Operation(
                        OperationDefinition::new(OperationKind::Query).with_name("First"),
                    ),
                    Definition::Operation(
                        OperationDefinition::new(OperationKind::Mutation).with_name("Second"),
                    ),
                ],
            }
        }

        #[test]
        fn matches_by_name() {
            let doc = two_operations();
            let op = doc.operation(Some("Second")).unwrap();
            assert_eq!(op.kind, OperationKind::Mutation);
        }

        #[test]
        fn named_definition_needs_a_requested_name() {
            let doc = two_operations();
            assert!(doc.operation(None).is_none());
            assert!(doc.operation(Some("Third")).is_none());
        }

        #[test]
        fn single_named_operation_matches_without_a_requested_name() {
            let doc = login_document();
            let op = doc.operation(None).unwrap();
            assert_eq!(op.name.as_deref(), Some("LoginMutation"));
            assert!(doc.operation(Some("Other")).is_none());
        }

        #[test]
        fn unnamed_definition_always_matches() {
            let doc: Document = OperationDefinition::new(OperationKind::Mutation).into();
            assert!(doc.operation(Some("Anything")).is_some());
            assert!(doc.operation(None).is_some());
        }
    }

    #[test]
    fn response_key_prefers_alias() {
        let field = Field::new("loginEmailPassword").with_alias("login");
        assert_eq!(field.response_key(), "login");
        assert_eq!(Field::new("logoutUser").response_key(), "logoutUser");
    }
}
